//! Storage Module
//!
//! The backing store and the pooled access layer every session goes
//! through.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐ ┌────────────────────┐ ┌────────────────────┐
//! │ ProductRepository  │ │  UserRepository    │ │ SupplierRepository │
//! └─────────┬──────────┘ └─────────┬──────────┘ └─────────┬──────────┘
//!           └──────────────────────┼──────────────────────┘
//!                                  ▼
//!                    ┌───────────────────────────┐
//!                    │  StorePool (bb8, max N)   │
//!                    └─────────────┬─────────────┘
//!                                  ▼
//!                    ┌───────────────────────────┐
//!                    │  Database                 │
//!                    │  products/users/suppliers │
//!                    │  + JSON snapshot file     │
//!                    └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use stockroom::storage::{Database, PoolConfig, ProductRepository, StorePool};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let pool = StorePool::new(Arc::new(Database::new()), PoolConfig::default())
//!     .await
//!     .unwrap();
//! let products = ProductRepository::new(pool);
//! assert!(products.get_all().await.unwrap().is_empty());
//! # });
//! ```

pub mod engine;
pub mod pool;
pub mod repository;

// Re-export commonly used types
pub use engine::{Database, Entity, StoreError, StoreResult, StoreStats};
pub use pool::{PoolConfig, PooledConnection, StoreConnection, StoreManager, StorePool};
pub use repository::{ProductRepository, SupplierRepository, UserRepository};
