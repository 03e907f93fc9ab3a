//! Connection Handler Module
//!
//! This module manages individual client sessions. Each session is owned by
//! one worker from the bounded pool for its whole lifetime.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TLS Listener                            │
//! │                  (server::listener)                         │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() + enqueue
//!                        ▼
//!           ┌────────────────────────┐
//!           │  WorkerPool (N tasks)  │
//!           │  handshake on worker   │
//!           └────────────┬───────────┘
//!                        │
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Split line  │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Transport-generic**: runs over any `AsyncRead + AsyncWrite` stream
//! - **Buffer Management**: BytesMut buffer with a hard line-size limit
//! - **Pipelining**: several request lines in one read are answered in order
//! - **Panic isolation**: a panicking command yields a `FAILURE` response
//! - **Statistics**: tracks session, command and handshake metrics

pub mod handler;

// Re-export commonly used types
pub use handler::{
    handle_connection, run_isolated, ConnectionError, ConnectionHandler, ConnectionStats,
    MAX_LINE_SIZE,
};
