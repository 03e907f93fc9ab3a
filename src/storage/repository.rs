//! Per-entity data access over the connection pool.
//!
//! Each repository call checks out one pooled connection, performs exactly
//! one store operation, and releases the connection on return.

use crate::model::{Product, Supplier, User};
use crate::storage::engine::StoreResult;
use crate::storage::pool::StorePool;

/// Product data access.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: StorePool,
}

impl ProductRepository {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Inserts one product; a taken SKU is a duplicate-key error.
    pub async fn add_one(&self, product: Product) -> StoreResult<()> {
        self.pool.run(move |db| db.insert_product(product)).await
    }

    /// Inserts a batch atomically and returns the number inserted.
    pub async fn add_many(&self, products: Vec<Product>) -> StoreResult<usize> {
        self.pool.run(move |db| db.insert_products(products)).await
    }

    pub async fn get_all(&self) -> StoreResult<Vec<Product>> {
        self.pool.run(|db| db.list_products()).await
    }

    /// Returns the products flagged as low stock.
    pub async fn get_low_stock(&self) -> StoreResult<Vec<Product>> {
        self.pool
            .run(|db| {
                let mut products = db.list_products()?;
                products.retain(Product::is_low_stock);
                Ok(products)
            })
            .await
    }

    pub async fn update(&self, product: Product) -> StoreResult<()> {
        self.pool.run(move |db| db.update_product(product)).await
    }

    /// Removes the listed SKUs, skipping unknown ones.
    pub async fn remove_by_keys(&self, skus: Vec<String>) -> StoreResult<usize> {
        self.pool.run(move |db| db.remove_products(&skus)).await
    }
}

/// User data access, including the login-attempt counter.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: StorePool,
}

impl UserRepository {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Inserts a new account and returns its id; a taken email is a
    /// duplicate-key error.
    pub async fn add_one(&self, user: User) -> StoreResult<i64> {
        self.pool.run(move |db| db.insert_user(user)).await
    }

    pub async fn get_all(&self) -> StoreResult<Vec<User>> {
        self.pool.run(|db| db.list_users()).await
    }

    pub async fn update(&self, user: User) -> StoreResult<()> {
        self.pool.run(move |db| db.update_user(user)).await
    }

    pub async fn remove_by_keys(&self, ids: Vec<i64>) -> StoreResult<usize> {
        self.pool.run(move |db| db.remove_users(&ids)).await
    }

    pub async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_string();
        self.pool.run(move |db| db.user_by_email(&email)).await
    }

    pub async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        self.pool.run(move |db| db.user_by_id(id)).await
    }

    /// Atomically adds one failed attempt and returns the new count.
    pub async fn record_failed_login(&self, id: i64) -> StoreResult<u32> {
        self.pool.run(move |db| db.increment_login_attempts(id)).await
    }

    pub async fn reset_login_attempts(&self, id: i64) -> StoreResult<()> {
        self.pool.run(move |db| db.reset_login_attempts(id)).await
    }
}

/// Supplier data access.
#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: StorePool,
}

impl SupplierRepository {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Inserts a supplier and returns the id the store assigned.
    pub async fn add_one(&self, supplier: Supplier) -> StoreResult<i64> {
        self.pool.run(move |db| db.insert_supplier(supplier)).await
    }

    pub async fn get_all(&self) -> StoreResult<Vec<Supplier>> {
        self.pool.run(|db| db.list_suppliers()).await
    }

    pub async fn update(&self, supplier: Supplier) -> StoreResult<()> {
        self.pool.run(move |db| db.update_supplier(supplier)).await
    }

    pub async fn remove_by_keys(&self, ids: Vec<i64>) -> StoreResult<usize> {
        self.pool.run(move |db| db.remove_suppliers(&ids)).await
    }
}
