//! TLS Server Module
//!
//! Owns the listening socket, the TLS configuration and the bounded pool of
//! session workers.
//!
//! - [`tls`] loads the certificate chain and key from PEM files
//! - [`workers`] runs at most N sessions at once, queueing the rest
//! - [`listener`] accepts sockets and hands them to the pool

pub mod listener;
pub mod tls;
pub mod workers;

pub use listener::{
    Server, ServerError, ServerOptions, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_SHUTDOWN_GRACE,
    DEFAULT_WORKERS,
};
pub use tls::{acceptor_from_der, load_acceptor, load_certs, load_key, TlsError};
pub use workers::WorkerPool;
