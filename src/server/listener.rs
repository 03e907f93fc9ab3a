//! TLS accept loop.
//!
//! The accept loop only accepts sockets and queues them. Everything else,
//! including the TLS handshake, happens on a pool worker:
//!
//! ```text
//!   accept() ──► WorkerPool::submit(Session)
//!                         │
//!                         ▼  (one worker per session)
//!                 TLS handshake (timeout)
//!                         │
//!                         ▼
//!                 handle_connection()
//! ```

use super::workers::WorkerPool;
use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Default number of session workers
pub const DEFAULT_WORKERS: usize = 10;

/// Default time to wait for in-flight sessions at shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Default time allowed for a client to complete the TLS handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Tuning for the accept loop and worker pool.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Number of sessions served at once
    pub workers: usize,
    /// How long shutdown waits for in-flight sessions
    pub shutdown_grace: Duration,
    /// How long a client has to finish the TLS handshake
    pub handshake_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Errors starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An accepted socket waiting for a worker.
struct Session {
    stream: TcpStream,
    addr: SocketAddr,
    accepted_at: Instant,
}

/// State every worker needs to serve a session.
struct SessionContext {
    acceptor: TlsAcceptor,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    handshake_timeout: Duration,
}

impl SessionContext {
    async fn serve(&self, session: Session) {
        let Session {
            stream,
            addr,
            accepted_at,
        } = session;
        let queued_ms = accepted_at.elapsed().as_millis() as u64;

        let tls = match tokio::time::timeout(self.handshake_timeout, self.acceptor.accept(stream))
            .await
        {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                self.stats.handshake_failed();
                warn!(client = %addr, error = %e, "TLS handshake failed");
                return;
            }
            Err(_) => {
                self.stats.handshake_failed();
                warn!(client = %addr, "TLS handshake timed out");
                return;
            }
        };

        let (_, conn) = tls.get_ref();
        info!(
            client = %addr,
            protocol = ?conn.protocol_version(),
            cipher = ?conn.negotiated_cipher_suite().map(|suite| suite.suite()),
            queued_ms,
            "TLS session established"
        );

        handle_connection(tls, addr, self.handler.clone(), Arc::clone(&self.stats)).await;
    }
}

/// The TLS server.
pub struct Server {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    options: ServerOptions,
}

impl Server {
    /// Binds the listening socket.
    pub async fn bind(
        addr: &str,
        acceptor: TlsAcceptor,
        handler: CommandHandler,
        options: ServerOptions,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            acceptor,
            handler,
            stats: Arc::new(ConnectionStats::new()),
            options,
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Serves connections until `shutdown` completes, then drains the pool.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let Self {
            listener,
            acceptor,
            handler,
            stats,
            options,
        } = self;

        let context = Arc::new(SessionContext {
            acceptor,
            handler,
            stats,
            handshake_timeout: options.handshake_timeout,
        });

        let pool = WorkerPool::start(options.workers, move |session: Session| {
            let context = Arc::clone(&context);
            async move { context.serve(session).await }
        });

        info!(
            addr = %listener.local_addr()?,
            workers = pool.size(),
            "Listening for TLS connections"
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping accept loop");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!(client = %addr, busy = pool.busy(), "Accepted connection");
                            let session = Session {
                                stream,
                                addr,
                                accepted_at: Instant::now(),
                            };
                            if pool.submit(session).is_err() {
                                warn!(client = %addr, "Worker pool closed, dropping connection");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            }
        }

        drop(listener);

        if pool.shutdown(options.shutdown_grace).await {
            info!("All sessions finished");
        } else {
            warn!("Shutdown grace period elapsed, remaining sessions aborted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Argon2Hasher, HashParams};
    use crate::client::Client;
    use crate::protocol::Status;
    use crate::server::tls::acceptor_from_der;
    use crate::server::tls::testing::{self_signed, TestCert};
    use crate::storage::{Database, PoolConfig, StorePool};
    use rustls::RootCertStore;
    use std::sync::atomic::Ordering;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    struct TestServer {
        addr: SocketAddr,
        cert: TestCert,
        stats: Arc<ConnectionStats>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
    }

    async fn create_server(options: ServerOptions) -> TestServer {
        let cert = self_signed();
        let acceptor = acceptor_from_der(vec![cert.cert.clone()], cert.key.clone_key()).unwrap();

        let pool = StorePool::new(Arc::new(Database::new()), PoolConfig::default())
            .await
            .unwrap();
        let hasher = Arc::new(Argon2Hasher::new(HashParams::fast()).unwrap());
        let handler = CommandHandler::new(pool, hasher);

        let server = Server::bind("127.0.0.1:0", acceptor, handler, options)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let stats = server.stats();

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run(async move {
            let _ = shutdown_rx.await;
        }));

        TestServer {
            addr,
            cert,
            stats,
            shutdown,
            task,
        }
    }

    async fn connect(server: &TestServer) -> Client {
        Client::connect(server.addr, "localhost", server.cert.roots())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_product_round_trip() {
        let server = create_server(ServerOptions::default()).await;
        let mut client = connect(&server).await;

        let response = client
            .request("ADD_PRODUCT", "ABC|Acme|Widget|blue|5|2.50|")
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.payload(), "");

        let response = client.request("GET_ALL_PRODUCTS", "").await.unwrap();
        assert_eq!(response.records(), vec!["ABC|Acme|Widget|blue|5|2.50|"]);

        client.close().await.unwrap();
        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_failures_keep_session_open() {
        let server = create_server(ServerOptions::default()).await;
        let mut client = connect(&server).await;

        let response = client.request("FOO", "bar").await.unwrap();
        assert_eq!(response.status(), Status::Failure);
        assert_eq!(response.payload(), "Unknown command: FOO");

        let response = client.request("LOGIN", "ghost@x.com|pw").await.unwrap();
        assert_eq!(response.status(), Status::Failure);
        assert_eq!(response.payload(), "Invalid email or password.");

        let response = client.request("GET_ALL_SUPPLIERS", "").await.unwrap();
        assert!(response.is_success());

        client.close().await.unwrap();
        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_untrusted_certificate_rejected() {
        let server = create_server(ServerOptions::default()).await;

        let result = Client::connect(server.addr, "localhost", RootCertStore::empty()).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(server.stats.handshake_failures.load(Ordering::Relaxed), 1);

        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_silent_client_times_out_handshake() {
        let server = create_server(ServerOptions {
            handshake_timeout: Duration::from_millis(100),
            ..ServerOptions::default()
        })
        .await;

        let _silent = TcpStream::connect(server.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(server.stats.handshake_failures.load(Ordering::Relaxed), 1);

        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_extra_sessions_wait_for_free_worker() {
        let server = create_server(ServerOptions {
            workers: 1,
            ..ServerOptions::default()
        })
        .await;

        let mut first = connect(&server).await;
        assert!(first.request("GET_ALL_PRODUCTS", "").await.unwrap().is_success());

        let addr = server.addr;
        let roots = server.cert.roots();
        let mut second = tokio::spawn(async move {
            let mut client = Client::connect(addr, "localhost", roots).await.unwrap();
            client.request("GET_ALL_PRODUCTS", "").await.unwrap()
        });

        // The only worker is still owned by the first session.
        let waited = tokio::time::timeout(Duration::from_millis(300), &mut second).await;
        assert!(waited.is_err());

        first.close().await.unwrap();

        let response = tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .unwrap()
            .unwrap();
        assert!(response.is_success());

        let _ = server.shutdown.send(());
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_aborts_idle_session_after_grace() {
        let server = create_server(ServerOptions {
            shutdown_grace: Duration::from_millis(100),
            ..ServerOptions::default()
        })
        .await;

        let mut client = connect(&server).await;
        assert!(client.request("GET_ALL_USERS", "").await.unwrap().is_success());

        let _ = server.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), server.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // The aborted session's socket is gone.
        assert!(client.request("GET_ALL_USERS", "").await.is_err());
    }

    #[tokio::test]
    async fn test_bind_error_names_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let cert = self_signed();
        let acceptor = acceptor_from_der(vec![cert.cert.clone()], cert.key.clone_key()).unwrap();
        let pool = StorePool::new(Arc::new(Database::new()), PoolConfig::default())
            .await
            .unwrap();
        let hasher = Arc::new(Argon2Hasher::new(HashParams::fast()).unwrap());
        let handler = CommandHandler::new(pool, hasher);

        let result = Server::bind(&addr, acceptor, handler, ServerOptions::default()).await;
        match result {
            Err(ServerError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            _ => panic!("expected bind error"),
        }
        drop(taken);
    }
}
