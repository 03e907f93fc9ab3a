//! Server configuration.
//!
//! Every setting can come from a command-line flag or a `STOCKROOM_*`
//! environment variable; flags win.

use crate::auth::{HashParams, DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB, DEFAULT_PARALLELISM};
use crate::server::ServerOptions;
use crate::storage::PoolConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors found before startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("port must not be 0")]
    ZeroPort,

    #[error("--workers must be at least 1")]
    ZeroWorkers,

    #[error("--pool-size must be at least 1")]
    ZeroPoolSize,

    #[error("{kind} file not found: {path}")]
    MissingFile { kind: &'static str, path: PathBuf },
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "stockroom",
    version,
    about = "TLS inventory server for products, users and suppliers"
)]
pub struct ServerConfig {
    /// Host to bind to
    #[arg(long, env = "STOCKROOM_HOST", default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "STOCKROOM_PORT", default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Number of sessions served concurrently
    #[arg(long, env = "STOCKROOM_WORKERS", default_value_t = crate::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Maximum store connections in the pool
    #[arg(long, env = "STOCKROOM_POOL_SIZE", default_value_t = 10)]
    pub pool_size: u32,

    /// Seconds to wait for a free store connection
    #[arg(long, env = "STOCKROOM_POOL_TIMEOUT_SECS", default_value_t = 5)]
    pub pool_timeout_secs: u64,

    /// PEM certificate chain presented to clients
    #[arg(long, env = "STOCKROOM_CERT", value_name = "FILE")]
    pub cert: PathBuf,

    /// PEM private key for the certificate
    #[arg(long, env = "STOCKROOM_KEY", value_name = "FILE")]
    pub key: PathBuf,

    /// JSON snapshot file; the store is memory-only when omitted
    #[arg(long, env = "STOCKROOM_DATA_FILE", value_name = "FILE")]
    pub data_file: Option<PathBuf>,

    /// Seconds to wait for in-flight sessions at shutdown
    #[arg(long, env = "STOCKROOM_SHUTDOWN_GRACE_SECS", default_value_t = 30)]
    pub shutdown_grace_secs: u64,

    /// Seconds a client has to complete the TLS handshake
    #[arg(long, env = "STOCKROOM_HANDSHAKE_TIMEOUT_SECS", default_value_t = 10)]
    pub handshake_timeout_secs: u64,

    /// Argon2 memory cost in KiB
    #[arg(long, env = "STOCKROOM_HASH_MEMORY_KIB", default_value_t = DEFAULT_MEMORY_KIB)]
    pub hash_memory_kib: u32,

    /// Argon2 iteration count
    #[arg(long, env = "STOCKROOM_HASH_ITERATIONS", default_value_t = DEFAULT_ITERATIONS)]
    pub hash_iterations: u32,

    /// Argon2 lanes
    #[arg(long, env = "STOCKROOM_HASH_PARALLELISM", default_value_t = DEFAULT_PARALLELISM)]
    pub hash_parallelism: u32,
}

impl ServerConfig {
    /// Checks settings that clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        for (kind, path) in [("certificate", &self.cert), ("key", &self.key)] {
            if !path.is_file() {
                return Err(ConfigError::MissingFile {
                    kind,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            workers: self.workers,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.pool_size,
            connection_timeout: Duration::from_secs(self.pool_timeout_secs),
        }
    }

    pub fn hash_params(&self) -> HashParams {
        HashParams {
            memory_kib: self.hash_memory_kib,
            iterations: self.hash_iterations,
            parallelism: self.hash_parallelism,
        }
    }
}
