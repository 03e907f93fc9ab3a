//! Bounded connection pool over the backing store.
//!
//! Every collaborator call checks out exactly one [`StoreConnection`] for
//! the duration of that call and returns it when the guard drops, so no
//! connection is ever held across wire requests.
//!
//! ```text
//!   session ──► StorePool::run(op) ──► bb8 checkout ──► spawn_blocking(op(&db))
//!                                          │
//!                                          └─ waits up to `connection_timeout`
//!                                             when all `max_size` are in use
//! ```

use crate::storage::engine::{Database, StoreError, StoreResult};
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default maximum number of pooled connections.
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Default time to wait for a free connection.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Sizing of the connection pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Maximum number of connections open at once
    pub max_size: u32,
    /// How long a checkout waits before failing with `PoolTimeout`
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_SIZE,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

/// A logical connection to the backing store.
#[derive(Debug)]
pub struct StoreConnection {
    id: u64,
    db: Arc<Database>,
}

impl StoreConnection {
    /// Returns the connection's sequence number (for diagnostics).
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Deref for StoreConnection {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

/// Opens and health-checks [`StoreConnection`]s for `bb8`.
#[derive(Debug)]
pub struct StoreManager {
    db: Arc<Database>,
    next_id: AtomicU64,
}

impl StoreManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl bb8::ManageConnection for StoreManager {
    type Connection = StoreConnection;
    type Error = StoreError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.db.ensure_available()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(connection = id, "Opened store connection");
        Ok(StoreConnection {
            id,
            db: Arc::clone(&self.db),
        })
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.db.ensure_available()
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        !conn.db.is_available()
    }
}

/// Checked-out connection guard; returns the connection to the pool on drop.
pub type PooledConnection<'a> = bb8::PooledConnection<'a, StoreManager>;

/// The shared connection pool, constructed once at startup and cloned into
/// every component that talks to the store.
#[derive(Clone)]
pub struct StorePool {
    inner: bb8::Pool<StoreManager>,
    db: Arc<Database>,
}

impl std::fmt::Debug for StorePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("StorePool")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

impl StorePool {
    /// Builds the pool over `db`.
    pub async fn new(db: Arc<Database>, config: PoolConfig) -> StoreResult<Self> {
        let inner = bb8::Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .test_on_check_out(true)
            .build(StoreManager::new(Arc::clone(&db)))
            .await?;

        Ok(Self { inner, db })
    }

    /// Checks out one connection, waiting up to the configured timeout.
    pub async fn get(&self) -> StoreResult<PooledConnection<'_>> {
        self.db.ensure_available()?;
        self.inner.get().await.map_err(|e| match e {
            bb8::RunError::User(e) => e,
            bb8::RunError::TimedOut => {
                warn!("Timed out waiting for a store connection");
                StoreError::PoolTimeout
            }
        })
    }

    /// Runs one blocking store operation on a checked-out connection.
    ///
    /// The connection stays checked out until `op` returns and is released
    /// immediately afterwards.
    pub async fn run<F, T>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.get().await?;
        let db = Arc::clone(&conn.db);

        let result = tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Task(e.to_string()));

        drop(conn);
        result?
    }

    /// Checks that a connection can be established (startup health check).
    pub async fn ping(&self) -> StoreResult<()> {
        let conn = self.get().await?;
        debug!(connection = conn.id(), "Store reachable");
        Ok(())
    }

    /// Returns the pool's current size and idle count.
    pub fn state(&self) -> bb8::State {
        self.inner.state()
    }

    /// Returns the backing store.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}
