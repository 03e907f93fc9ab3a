//! # Stockroom - A TLS Inventory Server
//!
//! Stockroom serves product, user and supplier records to remote clients
//! over TLS using a small line-oriented text protocol. Every request line
//! `COMMAND::DATA` gets exactly one response line.
//!
//! ## Features
//!
//! - **TLS only**: rustls terminates every connection, no client certificates
//! - **Bounded concurrency**: a fixed pool of workers owns one session each
//! - **Pooled store access**: all reads and writes go through a bb8 pool
//! - **Safe logins**: Argon2id hashes, constant-shape failures, lockout after
//!   five wrong passwords
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Stockroom                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TLS Server  │───>│ WorkerPool  │───>│ Connection  │                  │
//! │  │ (accept)    │    │ (N workers) │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Line      │    │              CommandHandler                  │    │
//! │  │   Codec     │    │   LoginGuard ── Argon2Hasher                 │    │
//! │  │             │    │   Product/User/SupplierRepository            │    │
//! │  └─────────────┘    └──────────────────────┬───────────────────────┘    │
//! │                                            │                            │
//! │                                            ▼                            │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │                     │  StorePool (bb8) ──> Database (+ snapshot)   │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use stockroom::auth::{Argon2Hasher, HashParams};
//! use stockroom::commands::CommandHandler;
//! use stockroom::server::{load_acceptor, Server, ServerOptions};
//! use stockroom::storage::{Database, PoolConfig, StorePool};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let acceptor = load_acceptor(Path::new("server.crt"), Path::new("server.key"))?;
//!     let pool = StorePool::new(Arc::new(Database::new()), PoolConfig::default()).await?;
//!     let hasher = Arc::new(Argon2Hasher::new(HashParams::default())?);
//!     let handler = CommandHandler::new(pool, hasher);
//!
//!     let server = Server::bind("0.0.0.0:8443", acceptor, handler, ServerOptions::default()).await?;
//!     server.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Format
//!
//! ```text
//! LOGIN::alice@example.com|s3cret          ->  SUCCESS|Alice|admin
//! GET_ALL_PRODUCTS::                       ->  SUCCESS|rec;rec;rec
//! FOO::bar                                 ->  FAILURE: Unknown command: FOO
//! ```
//!
//! Success and lockout responses are `STATUS|payload`; failures are
//! `FAILURE: message`. See [`commands`] for the full command list.
//!
//! ## Module Overview
//!
//! - [`protocol`]: line codec, delimiters and response types
//! - [`model`]: product, user and supplier records and their validation
//! - [`storage`]: the backing store, its connection pool and repositories
//! - [`auth`]: password hashing and the login lockout sequence
//! - [`commands`]: the command table and dispatcher
//! - [`connection`]: the per-session read/dispatch/write loop
//! - [`server`]: TLS setup, worker pool and accept loop
//! - [`config`]: command-line and environment configuration
//! - [`client`]: a TLS client for the protocol
//!
//! ## Design Highlights
//!
//! ### Handshake on the Worker
//!
//! The accept loop never blocks on a client. The TLS handshake runs on the
//! worker that will own the session, under a timeout, so a slow peer only
//! ever ties up one worker.
//!
//! ### Atomic Logins
//!
//! Each login for a known account holds that account's lock from the first
//! read to the counter update. Concurrent wrong guesses are all counted and
//! cannot slip past the lockout threshold.

pub mod auth;
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod model;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export main types for convenience
pub use client::Client;
pub use commands::CommandHandler;
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, Request, Response, Status};
pub use server::{Server, ServerOptions, DEFAULT_WORKERS};
pub use storage::{Database, StorePool};

/// Default port for the server
pub const DEFAULT_PORT: u16 = 8443;

/// Default host for the server
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
