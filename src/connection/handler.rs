//! Connection Handler Module
//!
//! This module handles one client session end to end. A worker hands it
//! the established TLS stream; the handler loops reading request lines and
//! writing exactly one response line per request.
//!
//! ## Session Lifecycle
//!
//! ```text
//! 1. Worker completes the TLS handshake
//!        │
//!        ▼
//! 2. ConnectionHandler created (stats: accepted + active)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from stream  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Take one '\n' line      │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Dispatch (isolated)     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Write + flush response  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Peer closes / transport error / line too long
//!        │
//!        ▼
//! 5. Stream shut down, handler dropped (stats: active - 1)
//! ```
//!
//! ## Buffer Management
//!
//! A BytesMut buffer accumulates incoming data, since one read may carry a
//! partial line or several lines. A buffer that grows past the maximum line
//! size without a newline ends the session.

use crate::commands::{CommandHandler, INTERNAL_ERROR};
use crate::protocol::{find_line_end, ParseError, Response};
use bytes::BytesMut;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Maximum length of one request line (8 MiB)
pub const MAX_LINE_SIZE: usize = 8 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of sessions started
    pub connections_accepted: AtomicU64,
    /// Currently active sessions
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
    /// TLS handshakes that failed or timed out
    pub handshake_failures: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handles a single client session.
///
/// Generic over the transport so the same loop runs over TLS in production
/// and over in-memory mocks in tests.
pub struct ConnectionHandler<S> {
    /// The (encrypted) stream for this session
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Longest line accepted before the session is dropped
    max_line_size: usize,

    /// The command handler (shared across sessions)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Creates a new connection handler.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            max_line_size: MAX_LINE_SIZE,
            command_handler,
            stats,
        }
    }

    /// Overrides the maximum line size.
    pub fn with_max_line_size(mut self, max_line_size: usize) -> Self {
        self.max_line_size = max_line_size;
        self
    }

    /// Runs the session until the client disconnects or a transport fault.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    info!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        // Best effort: the peer may already be gone.
        if let Err(e) = self.stream.shutdown().await {
            trace!(client = %self.addr, error = %e, "Stream shutdown failed");
        }

        result
    }

    /// The main read-dispatch-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Answer every complete line already buffered
            while let Some(line) = self.take_line() {
                let response = self.dispatch(line).await;
                self.stats.command_processed();
                self.send_response(&response).await?;
            }

            // Need more data - read from the stream
            self.read_more_data().await?;
        }
    }

    /// Removes one complete line from the buffer, without its terminator.
    fn take_line(&mut self) -> Option<BytesMut> {
        let end = find_line_end(&self.buffer)?;
        let mut line = self.buffer.split_to(end + 1);
        line.truncate(end);
        trace!(
            client = %self.addr,
            length = end,
            remaining = self.buffer.len(),
            "Received line"
        );
        Some(line)
    }

    /// Decodes a line as UTF-8 and runs it through the command handler.
    async fn dispatch(&self, line: BytesMut) -> Response {
        let line = match String::from_utf8(line.to_vec()) {
            Ok(line) => line,
            Err(_) => {
                warn!(client = %self.addr, "Request is not valid UTF-8");
                return Response::failure(ParseError::InvalidUtf8.to_string());
            }
        };

        let handler = self.command_handler.clone();
        run_isolated(self.addr, async move { handler.execute(&line).await }).await
    }

    /// Reads more data from the stream into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Check line size limit
        if self.buffer.len() >= self.max_line_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Line size limit exceeded"
            );
            return Err(ConnectionError::LineTooLong);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        // Read data
        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Stream closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Unterminated line in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Writes one response line and flushes it.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.to_line();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

// Runs on every exit path, including cancellation at shutdown.
impl<S> Drop for ConnectionHandler<S> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}

/// Runs one dispatch on its own task so a panic becomes a generic failure
/// response instead of unwinding through the session.
///
/// Dropping the returned future aborts the dispatch task, so a session
/// cancelled at shutdown does not leave its command running.
pub async fn run_isolated<F>(addr: SocketAddr, dispatch: F) -> Response
where
    F: Future<Output = Response> + Send + 'static,
{
    let mut task = AbortOnDrop(tokio::spawn(dispatch));
    match (&mut task.0).await {
        Ok(response) => response,
        Err(e) => {
            error!(client = %addr, error = %e, "Command dispatch panicked");
            Response::failure(INTERNAL_ERROR)
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (unterminated line)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// A line exceeded the maximum size without a terminator
    #[error("Line size limit exceeded")]
    LineTooLong,
}

/// Handles a client session.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
