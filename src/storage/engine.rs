//! In-Memory Relational Store
//!
//! This module implements the backing store behind the connection pool: one
//! table per entity, unique-key constraints, server-assigned ids, and
//! optional write-through persistence to a JSON snapshot file.
//!
//! ## Design Decisions
//!
//! 1. **One lock per table**: products, users and suppliers each sit behind
//!    their own `RwLock`, so reads of one table never wait on writes to another.
//! 2. **Constraint checks under the write lock**: duplicate detection and the
//!    write that follows happen in one critical section, which serializes
//!    concurrent mutations of the same key.
//! 3. **Ordered tables**: `BTreeMap` gives read-all results a stable order
//!    (products by SKU, users and suppliers by id).
//! 4. **Write-through snapshots**: a mutation is applied to a staged copy of
//!    its table, the whole store is written to a temp file and renamed over
//!    the snapshot, and only then is the staged table swapped in.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                             │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐           │
//! │  │  products  │   │   users    │   │ suppliers  │           │
//! │  │   RwLock   │   │   RwLock   │   │   RwLock   │           │
//! │  │  BTreeMap  │   │  BTreeMap  │   │  BTreeMap  │           │
//! │  └────────────┘   └────────────┘   └────────────┘           │
//! │                 persist lock (snapshot writer)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Memory-only writers hold exactly one table lock at a time. With a snapshot
//! file, writers take the persist lock first, then the write lock of the
//! table they mutate, then read locks on the other tables.

use crate::model::{normalize_email, Product, Supplier, User};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, error, info};

/// The entity a store error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Product,
    User,
    Supplier,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Product => "product",
            Entity::User => "user",
            Entity::Supplier => "supplier",
        })
    }
}

/// Errors raised by the backing store and its connection pool.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key (SKU, email) is already taken
    #[error("duplicate {entity} key '{key}'")]
    Duplicate { entity: Entity, key: String },

    /// The record to update does not exist
    #[error("{entity} '{key}' not found")]
    NotFound { entity: Entity, key: String },

    /// The store cannot be reached
    #[error("backing store unavailable")]
    Unavailable,

    /// No pooled connection became free in time
    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,

    /// A blocking store task failed to complete
    #[error("store task failed: {0}")]
    Task(String),

    /// Reading or writing the snapshot file failed
    #[error("snapshot I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot file could not be encoded or decoded
    #[error("snapshot format error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for a unique-key violation.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Statistics about the store.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub products: usize,
    pub users: usize,
    pub suppliers: usize,
    pub reads: u64,
    pub writes: u64,
}

/// On-disk snapshot format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    products: Vec<Product>,
    users: Vec<User>,
    suppliers: Vec<Supplier>,
}

/// The backing store.
///
/// Designed to be wrapped in an `Arc` and reached through
/// [`StorePool`](crate::storage::StorePool). All operations are blocking but
/// short; the pool runs them on the blocking thread pool.
pub struct Database {
    products: RwLock<BTreeMap<String, Product>>,
    users: RwLock<BTreeMap<i64, User>>,
    suppliers: RwLock<BTreeMap<i64, Supplier>>,

    next_user_id: AtomicI64,
    next_supplier_id: AtomicI64,

    /// Cleared to simulate losing connectivity to the store
    available: AtomicBool,

    /// Where snapshots are written, if persistence is enabled
    snapshot_path: Option<PathBuf>,
    persist_lock: Mutex<()>,

    read_count: AtomicU64,
    write_count: AtomicU64,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("products", &self.products.read().len())
            .field("users", &self.users.read().len())
            .field("suppliers", &self.suppliers.read().len())
            .field("snapshot_path", &self.snapshot_path)
            .finish()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Creates an empty, memory-only store.
    pub fn new() -> Self {
        Self {
            products: RwLock::new(BTreeMap::new()),
            users: RwLock::new(BTreeMap::new()),
            suppliers: RwLock::new(BTreeMap::new()),
            next_user_id: AtomicI64::new(1),
            next_supplier_id: AtomicI64::new(1),
            available: AtomicBool::new(true),
            snapshot_path: None,
            persist_lock: Mutex::new(()),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
        }
    }

    /// Opens a store, loading the snapshot at `path` if one exists.
    ///
    /// With `None` the store is memory-only. A missing snapshot file yields an
    /// empty store that will be persisted to `path`; a corrupt file is an error.
    pub fn open(path: Option<PathBuf>) -> StoreResult<Self> {
        let Some(path) = path else {
            return Ok(Self::new());
        };

        let snapshot = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No snapshot found, starting with an empty store");
                Snapshot::default()
            }
            Err(e) => return Err(e.into()),
        };

        let db = Self {
            snapshot_path: Some(path),
            ..Self::new()
        };
        db.restore(snapshot);

        info!(
            products = db.products.read().len(),
            users = db.users.read().len(),
            suppliers = db.suppliers.read().len(),
            "Store loaded"
        );
        Ok(db)
    }

    fn restore(&self, snapshot: Snapshot) {
        let mut products = self.products.write();
        for product in snapshot.products {
            products.insert(product.sku.clone(), product);
        }

        let mut users = self.users.write();
        for user in snapshot.users {
            if let Some(id) = user.id {
                users.insert(id, user);
            }
        }
        let next = users.keys().next_back().map_or(1, |id| id + 1);
        self.next_user_id.store(next, Ordering::SeqCst);

        let mut suppliers = self.suppliers.write();
        for supplier in snapshot.suppliers {
            if let Some(id) = supplier.id {
                suppliers.insert(id, supplier);
            }
        }
        let next = suppliers.keys().next_back().map_or(1, |id| id + 1);
        self.next_supplier_id.store(next, Ordering::SeqCst);
    }

    // ========================================================================
    // Availability
    // ========================================================================

    /// Returns whether the store is reachable.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Marks the store reachable or unreachable.
    ///
    /// While unavailable every operation fails with [`StoreError::Unavailable`]
    /// and the pool refuses to hand out connections.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fails with [`StoreError::Unavailable`] if the store is unreachable.
    pub fn ensure_available(&self) -> StoreResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn begin_read(&self) -> StoreResult<()> {
        self.ensure_available()?;
        self.read_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn begin_write(&self) -> StoreResult<()> {
        self.ensure_available()?;
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    // ========================================================================
    // Products
    // ========================================================================

    /// Inserts one product. Fails with `Duplicate` if the SKU exists.
    pub fn insert_product(&self, product: Product) -> StoreResult<()> {
        self.begin_write()?;
        self.commit_products(|products| {
            if products.contains_key(&product.sku) {
                return Err(StoreError::Duplicate {
                    entity: Entity::Product,
                    key: product.sku,
                });
            }
            products.insert(product.sku.clone(), product);
            Ok(())
        })
    }

    /// Inserts a batch of products atomically.
    ///
    /// Either every product is inserted or none is: a SKU repeated inside the
    /// batch, or one that already exists, rejects the whole batch.
    pub fn insert_products(&self, batch: Vec<Product>) -> StoreResult<usize> {
        self.begin_write()?;
        self.commit_products(|products| {
            let count = batch.len();
            let mut seen = HashSet::with_capacity(count);
            for product in &batch {
                if products.contains_key(&product.sku) || !seen.insert(product.sku.as_str()) {
                    return Err(StoreError::Duplicate {
                        entity: Entity::Product,
                        key: product.sku.clone(),
                    });
                }
            }
            for product in batch {
                products.insert(product.sku.clone(), product);
            }
            Ok(count)
        })
    }

    /// Returns all products ordered by SKU.
    pub fn list_products(&self) -> StoreResult<Vec<Product>> {
        self.begin_read()?;
        Ok(self.products.read().values().cloned().collect())
    }

    /// Replaces the product with the same SKU. Fails with `NotFound` if absent.
    pub fn update_product(&self, product: Product) -> StoreResult<()> {
        self.begin_write()?;
        self.commit_products(|products| match products.get_mut(&product.sku) {
            Some(existing) => {
                *existing = product;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: Entity::Product,
                key: product.sku,
            }),
        })
    }

    /// Removes every product whose SKU is listed; unknown SKUs are skipped.
    ///
    /// Returns the number of products removed.
    pub fn remove_products(&self, skus: &[String]) -> StoreResult<usize> {
        self.begin_write()?;
        self.commit_products(|products| {
            Ok(skus.iter().filter(|sku| products.remove(*sku).is_some()).count())
        })
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Inserts a new user and returns its assigned id.
    ///
    /// Fails with `Duplicate` if the email is already registered.
    pub fn insert_user(&self, mut user: User) -> StoreResult<i64> {
        self.begin_write()?;
        user.email = normalize_email(&user.email);
        self.commit_users(|users| {
            if users.values().any(|u| u.email == user.email) {
                return Err(StoreError::Duplicate {
                    entity: Entity::User,
                    key: user.email,
                });
            }
            let id = self.next_user_id.fetch_add(1, Ordering::SeqCst);
            user.id = Some(id);
            user.login_attempts = 0;
            users.insert(id, user);
            Ok(id)
        })
    }

    /// Returns all users ordered by id.
    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        self.begin_read()?;
        Ok(self.users.read().values().cloned().collect())
    }

    /// Looks a user up by email (case-insensitive).
    pub fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.begin_read()?;
        let email = normalize_email(email);
        Ok(self.users.read().values().find(|u| u.email == email).cloned())
    }

    /// Looks a user up by id.
    pub fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        self.begin_read()?;
        Ok(self.users.read().get(&id).cloned())
    }

    /// Replaces the user with the same id.
    ///
    /// An empty `pwd_hash` keeps the stored hash. Fails with `NotFound` if the
    /// id is unknown and with `Duplicate` if the new email belongs to another
    /// account.
    pub fn update_user(&self, mut user: User) -> StoreResult<()> {
        self.begin_write()?;
        let Some(id) = user.id else {
            return Err(StoreError::NotFound {
                entity: Entity::User,
                key: String::new(),
            });
        };
        user.email = normalize_email(&user.email);
        self.commit_users(|users| {
            if users.values().any(|u| u.id != Some(id) && u.email == user.email) {
                return Err(StoreError::Duplicate {
                    entity: Entity::User,
                    key: user.email,
                });
            }
            let Some(existing) = users.get_mut(&id) else {
                return Err(StoreError::NotFound {
                    entity: Entity::User,
                    key: id.to_string(),
                });
            };
            if user.pwd_hash.is_empty() {
                user.pwd_hash = std::mem::take(&mut existing.pwd_hash);
            }
            *existing = user;
            Ok(())
        })
    }

    /// Removes every user whose id is listed; unknown ids are skipped.
    pub fn remove_users(&self, ids: &[i64]) -> StoreResult<usize> {
        self.begin_write()?;
        self.commit_users(|users| Ok(ids.iter().filter(|id| users.remove(*id).is_some()).count()))
    }

    /// Atomically increments a user's failed-login counter by one.
    ///
    /// Returns the new count.
    pub fn increment_login_attempts(&self, id: i64) -> StoreResult<u32> {
        self.begin_write()?;
        self.commit_users(|users| {
            let Some(user) = users.get_mut(&id) else {
                return Err(StoreError::NotFound {
                    entity: Entity::User,
                    key: id.to_string(),
                });
            };
            user.login_attempts = user.login_attempts.saturating_add(1);
            Ok(user.login_attempts)
        })
    }

    /// Resets a user's failed-login counter to zero.
    pub fn reset_login_attempts(&self, id: i64) -> StoreResult<()> {
        self.begin_write()?;
        self.commit_users(|users| {
            let Some(user) = users.get_mut(&id) else {
                return Err(StoreError::NotFound {
                    entity: Entity::User,
                    key: id.to_string(),
                });
            };
            user.login_attempts = 0;
            Ok(())
        })
    }

    // ========================================================================
    // Suppliers
    // ========================================================================

    /// Inserts a supplier and returns its assigned id. Any supplied id is ignored.
    pub fn insert_supplier(&self, mut supplier: Supplier) -> StoreResult<i64> {
        self.begin_write()?;
        self.commit_suppliers(|suppliers| {
            let id = self.next_supplier_id.fetch_add(1, Ordering::SeqCst);
            supplier.id = Some(id);
            suppliers.insert(id, supplier);
            Ok(id)
        })
    }

    /// Returns all suppliers ordered by id.
    pub fn list_suppliers(&self) -> StoreResult<Vec<Supplier>> {
        self.begin_read()?;
        Ok(self.suppliers.read().values().cloned().collect())
    }

    /// Replaces the supplier with the same id. Fails with `NotFound` if absent.
    pub fn update_supplier(&self, supplier: Supplier) -> StoreResult<()> {
        self.begin_write()?;
        let key = supplier.id.map(|id| id.to_string()).unwrap_or_default();
        self.commit_suppliers(|suppliers| match supplier.id.and_then(|id| suppliers.get_mut(&id)) {
            Some(existing) => {
                *existing = supplier;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: Entity::Supplier,
                key,
            }),
        })
    }

    /// Removes every supplier whose id is listed; unknown ids are skipped.
    pub fn remove_suppliers(&self, ids: &[i64]) -> StoreResult<usize> {
        self.begin_write()?;
        self.commit_suppliers(|suppliers| {
            Ok(ids.iter().filter(|id| suppliers.remove(*id).is_some()).count())
        })
    }

    // ========================================================================
    // Commit and persistence
    // ========================================================================

    fn commit_products<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, Product>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.commit(&self.products, apply, |staged: &BTreeMap<String, Product>| {
            self.capture(Some(staged), None, None)
        })
    }

    fn commit_users<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<i64, User>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.commit(&self.users, apply, |staged: &BTreeMap<i64, User>| {
            self.capture(None, Some(staged), None)
        })
    }

    fn commit_suppliers<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<i64, Supplier>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.commit(&self.suppliers, apply, |staged: &BTreeMap<i64, Supplier>| {
            self.capture(None, None, Some(staged))
        })
    }

    /// Applies a mutation to one table and persists the result.
    ///
    /// Without a snapshot file the mutation runs directly on the table. With
    /// one, it runs on a staged copy that replaces the live table only after
    /// the snapshot has been written, so a failed write leaves the store as it
    /// was before the call.
    fn commit<K, V, T>(
        &self,
        table: &RwLock<BTreeMap<K, V>>,
        apply: impl FnOnce(&mut BTreeMap<K, V>) -> StoreResult<T>,
        snapshot: impl FnOnce(&BTreeMap<K, V>) -> Snapshot,
    ) -> StoreResult<T>
    where
        K: Ord + Clone,
        V: Clone,
    {
        let Some(path) = &self.snapshot_path else {
            return apply(&mut *table.write());
        };

        // Lock order: persist lock, then the mutated table, then reads of the others.
        let _guard = self.persist_lock.lock();
        let mut live = table.write();
        let mut staged = live.clone();
        let result = apply(&mut staged)?;

        self.write_snapshot(path, &snapshot(&staged))?;
        *live = staged;
        Ok(result)
    }

    /// Builds a snapshot, taking staged rows where given and live rows otherwise.
    fn capture(
        &self,
        products: Option<&BTreeMap<String, Product>>,
        users: Option<&BTreeMap<i64, User>>,
        suppliers: Option<&BTreeMap<i64, Supplier>>,
    ) -> Snapshot {
        Snapshot {
            products: rows(products, &self.products),
            users: rows(users, &self.users),
            suppliers: rows(suppliers, &self.suppliers),
        }
    }

    /// Writes the snapshot file now, if persistence is enabled.
    pub fn flush(&self) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock();
        self.write_snapshot(path, &self.capture(None, None, None))
    }

    fn write_snapshot(&self, path: &Path, snapshot: &Snapshot) -> StoreResult<()> {
        write_atomically(path, &serde_json::to_vec_pretty(snapshot)?).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to write snapshot");
            StoreError::Io(e)
        })?;

        debug!(path = %path.display(), "Snapshot written");
        Ok(())
    }

    /// Returns statistics about the store.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            products: self.products.read().len(),
            users: self.users.read().len(),
            suppliers: self.suppliers.read().len(),
            reads: self.read_count.load(Ordering::Relaxed),
            writes: self.write_count.load(Ordering::Relaxed),
        }
    }
}

fn rows<K, V: Clone>(staged: Option<&BTreeMap<K, V>>, live: &RwLock<BTreeMap<K, V>>) -> Vec<V> {
    match staged {
        Some(table) => table.values().cloned().collect(),
        None => live.read().values().cloned().collect(),
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
