//! Authentication Module
//!
//! Credential hashing and the login lockout state machine.
//!
//! - [`hasher`]: Argon2id hashing behind the [`CredentialHasher`] trait
//! - [`lockout`]: the LOGIN sequence with per-account failed-attempt counting

pub mod hasher;
pub mod lockout;

pub use hasher::{
    hash_blocking, is_password_hash, resolve_credential, verify_blocking, Argon2Hasher,
    CredentialHasher, HashError, HashParams, DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB,
    DEFAULT_PARALLELISM,
};
pub use lockout::{
    AccountState, LoginGuard, LoginOutcome, ACCOUNT_LOCKED, INVALID_CREDENTIALS,
    LOCKOUT_THRESHOLD,
};
