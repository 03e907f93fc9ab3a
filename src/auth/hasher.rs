//! Credential Hasher
//!
//! One-way adaptive hashing of login secrets with Argon2id. Each hash gets
//! its own random salt and is stored in PHC string form
//! (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`), so verification always
//! uses the parameters the hash was created with.
//!
//! Hashing is deliberately slow. Async callers go through [`hash_blocking`]
//! and [`verify_blocking`], which move the work onto the blocking thread
//! pool so sessions on other workers keep running.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Default memory cost in KiB.
pub const DEFAULT_MEMORY_KIB: u32 = 19_456;

/// Default number of passes.
pub const DEFAULT_ITERATIONS: u32 = 2;

/// Default degree of parallelism.
pub const DEFAULT_PARALLELISM: u32 = 1;

/// Errors from hashing a secret.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    /// The configured work factor is outside what Argon2 accepts
    #[error("invalid hash parameters: {0}")]
    Params(String),

    /// Computing the hash failed
    #[error("hashing failed: {0}")]
    Hash(String),

    /// The blocking hash task did not complete
    #[error("hash task failed: {0}")]
    Task(String),
}

/// Argon2 work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

#[cfg(test)]
impl HashParams {
    /// The cheapest work factor Argon2 accepts.
    pub(crate) fn fast() -> Self {
        Self {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies login secrets.
pub trait CredentialHasher: Send + Sync + 'static {
    /// Hashes `plaintext` with a fresh random salt.
    fn hash(&self, plaintext: &str) -> Result<String, HashError>;

    /// Checks `plaintext` against a stored hash.
    ///
    /// Returns `false` for a structurally invalid hash rather than failing.
    fn verify(&self, plaintext: &str, hash: &str) -> bool;

    /// A valid hash of an unguessable secret, computed with the same work
    /// factor as real hashes. Verifying against it costs the same as
    /// verifying a real account.
    fn dummy_hash(&self) -> &str;
}

/// Argon2id implementation of [`CredentialHasher`].
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
    params: HashParams,
    dummy: String,
}

impl std::fmt::Debug for Argon2Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Hasher")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Argon2Hasher {
    /// Creates a hasher with the given work factor.
    ///
    /// Computes the dummy hash up front, so this call is itself slow.
    pub fn new(params: HashParams) -> Result<Self, HashError> {
        let argon_params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| HashError::Params(e.to_string()))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let mut hasher = Self {
            argon2,
            params,
            dummy: String::new(),
        };
        let secret = SaltString::generate(&mut OsRng);
        hasher.dummy = hasher.hash(secret.as_str())?;
        Ok(hasher)
    }

    pub fn params(&self) -> HashParams {
        self.params
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HashError::Hash(e.to_string()))
    }

    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    fn dummy_hash(&self) -> &str {
        &self.dummy
    }
}

/// Returns true if `value` is a complete Argon2 hash in PHC string form.
///
/// A complete hash names an Argon2 variant and carries a version, valid
/// cost parameters, a salt and a hash output. Strings that merely parse as
/// PHC, such as `$argon2id$hunter2`, do not qualify.
pub fn is_password_hash(value: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(value) else {
        return false;
    };
    Algorithm::try_from(parsed.algorithm).is_ok()
        && parsed.version.is_some()
        && parsed.salt.is_some()
        && parsed.hash.is_some()
        && Params::try_from(&parsed).is_ok()
}

/// Hashes `plaintext` on the blocking thread pool.
pub async fn hash_blocking(
    hasher: Arc<dyn CredentialHasher>,
    plaintext: String,
) -> Result<String, HashError> {
    tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
        .await
        .map_err(|e| HashError::Task(e.to_string()))?
}

/// Verifies `plaintext` against `hash` on the blocking thread pool.
///
/// A failed task counts as a mismatch.
pub async fn verify_blocking(
    hasher: Arc<dyn CredentialHasher>,
    plaintext: String,
    hash: String,
) -> bool {
    match tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash)).await {
        Ok(matched) => matched,
        Err(e) => {
            error!(error = %e, "Credential verification task failed");
            false
        }
    }
}

/// Turns a submitted credential field into the hash to store.
///
/// A value that is already an Argon2 PHC hash is kept as-is; anything else
/// is treated as a plaintext secret and hashed.
pub async fn resolve_credential(
    hasher: Arc<dyn CredentialHasher>,
    field: String,
) -> Result<String, HashError> {
    if is_password_hash(&field) {
        return Ok(field);
    }
    hash_blocking(hasher, field).await
}
