//! Command Handler Module
//!
//! Decodes one request line, dispatches it to the typed handler for its
//! command, and renders exactly one response.
//!
//! ## Supported Commands
//!
//! ### User Commands
//! - `LOGIN::email|password` - Authenticate; `SUCCESS|name|role`
//! - `SIGNUP::role|name|pwdHash|email|phone` - Create an account
//! - `GET_ALL_USERS::` - List accounts (`id|role|name|email|phone|loginAttempts`)
//! - `UPDATE_USER::id|role|name|pwdHash|email|phone|loginAttempts` - Replace an account
//! - `REMOVE_USER::id,id,...` - Delete accounts
//!
//! ### Product Commands
//! - `GET_ALL_PRODUCTS::` - List products ordered by SKU
//! - `GET_LOW_STOCK_PRODUCTS::` - List products with quantity at or below 10
//! - `ADD_PRODUCT::sku|brand|name|description|quantity|price|imageUrl`
//! - `UPDATE_PRODUCT::sku|brand|name|description|quantity|price|imageUrl`
//! - `REMOVE_PRODUCT::sku,sku,...`
//! - `BULK_ADD_PRODUCTS::record<RS>record<RS>...` - Insert a batch, all or nothing
//!
//! ### Supplier Commands
//! - `GET_ALL_SUPPLIERS::` - List suppliers ordered by id
//! - `ADD_SUPPLIER::[|]company|contactName|phone|email|address|notes`
//! - `UPDATE_SUPPLIER::id|company|contactName|phone|email|address|notes`
//! - `REMOVE_SUPPLIER::id,id,...`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐     │
//! │  │parse_request │──>│  dispatch()  │──>│   cmd_*()    │     │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘     │
//! │                                               │             │
//! │                          LoginGuard / *Repository (pool)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::auth::{resolve_credential, CredentialHasher, LoginGuard};
use crate::commands::command::Command;
use crate::commands::error::CommandError;
use crate::model::{
    parse_id, FieldError, Product, Supplier, User, WireRecord, PRODUCT_FIELDS, SIGNUP_FIELDS,
    SUPPLIER_FIELDS, USER_UPDATE_FIELDS,
};
use crate::protocol::{
    join_records, parse_request, split_fields, split_keys, split_records, Response,
    FIELD_DELIMITER,
};
use crate::storage::{ProductRepository, StorePool, SupplierRepository, UserRepository};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result type for command handlers.
type CommandResult = Result<Response, CommandError>;

/// Dispatches decoded requests to the data-access collaborators.
///
/// Cheap to clone; every clone shares the same pool and lock table.
#[derive(Clone)]
pub struct CommandHandler {
    products: ProductRepository,
    users: UserRepository,
    suppliers: SupplierRepository,
    login: LoginGuard,
    hasher: Arc<dyn CredentialHasher>,
}

impl CommandHandler {
    /// Creates a handler whose collaborators all share `pool`.
    pub fn new(pool: StorePool, hasher: Arc<dyn CredentialHasher>) -> Self {
        let users = UserRepository::new(pool.clone());
        Self {
            products: ProductRepository::new(pool.clone()),
            suppliers: SupplierRepository::new(pool),
            login: LoginGuard::new(users.clone(), Arc::clone(&hasher)),
            users,
            hasher,
        }
    }

    /// Executes one request line and returns its response.
    ///
    /// Never fails: every fault becomes a `FAILURE` response.
    pub async fn execute(&self, line: &str) -> Response {
        let request = match parse_request(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed request");
                return Response::failure(e.to_string());
            }
        };

        let Some(command) = Command::from_name(request.command) else {
            warn!(command = request.command, "Unknown command");
            return Response::failure(format!("Unknown command: {}", request.command));
        };

        match self.dispatch(command, request.data).await {
            Ok(response) => {
                debug!(command = %command, status = %response.status(), "Command executed");
                response
            }
            Err(e) => {
                if e.is_internal() {
                    error!(command = %command, error = %e, "Command failed");
                } else {
                    warn!(command = %command, error = %e, "Command rejected");
                }
                Response::failure(e.user_message())
            }
        }
    }

    /// Routes a resolved command to its handler.
    async fn dispatch(&self, command: Command, data: &str) -> CommandResult {
        match command {
            // User commands
            Command::Login => self.cmd_login(data).await,
            Command::Signup => self.cmd_signup(data).await,
            Command::GetAllUsers => self.cmd_get_all_users().await,
            Command::UpdateUser => self.cmd_update_user(data).await,
            Command::RemoveUser => self.cmd_remove_user(data).await,

            // Product commands
            Command::GetAllProducts => self.cmd_get_all_products().await,
            Command::GetLowStockProducts => self.cmd_get_low_stock_products().await,
            Command::AddProduct => self.cmd_add_product(data).await,
            Command::UpdateProduct => self.cmd_update_product(data).await,
            Command::RemoveProduct => self.cmd_remove_product(data).await,
            Command::BulkAddProducts => self.cmd_bulk_add_products(data).await,

            // Supplier commands
            Command::GetAllSuppliers => self.cmd_get_all_suppliers().await,
            Command::AddSupplier => self.cmd_add_supplier(data).await,
            Command::UpdateSupplier => self.cmd_update_supplier(data).await,
            Command::RemoveSupplier => self.cmd_remove_supplier(data).await,
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    /// Renders a read-all payload.
    fn list_response<T: WireRecord>(records: &[T]) -> Response {
        Response::success(join_records(records.iter().map(WireRecord::to_wire)))
    }

    /// Parses a comma-joined list of numeric ids.
    fn parse_ids(field: &'static str, data: &str) -> Result<Vec<i64>, CommandError> {
        split_keys(data)?
            .into_iter()
            .map(|key| parse_id(field, key).map_err(CommandError::from))
            .collect()
    }

    /// Decodes one product record.
    fn parse_product(record: &str) -> Result<Product, CommandError> {
        let fields = split_fields(record, PRODUCT_FIELDS)?;
        Ok(Product::from_fields(&fields)?)
    }

    // ========================================================================
    // User Commands
    // ========================================================================

    /// LOGIN email|password
    async fn cmd_login(&self, data: &str) -> CommandResult {
        let fields = split_fields(data, 2)?;
        let outcome = self.login.login(fields[0].trim(), fields[1]).await?;
        Ok(outcome.into_response())
    }

    /// SIGNUP role|name|pwdHash|email|phone
    async fn cmd_signup(&self, data: &str) -> CommandResult {
        let fields = split_fields(data, SIGNUP_FIELDS)?;
        let mut user = User::from_signup_fields(&fields)?;

        user.pwd_hash = resolve_credential(Arc::clone(&self.hasher), user.pwd_hash).await?;

        let role = user.role;
        let id = self.users.add_one(user).await?;
        info!(user_id = id, role = %role, "Account created");
        Ok(Response::ok())
    }

    /// GET_ALL_USERS
    async fn cmd_get_all_users(&self) -> CommandResult {
        let users = self.users.get_all().await?;
        Ok(Self::list_response(&users))
    }

    /// UPDATE_USER id|role|name|pwdHash|email|phone|loginAttempts
    async fn cmd_update_user(&self, data: &str) -> CommandResult {
        let fields = split_fields(data, USER_UPDATE_FIELDS)?;
        let mut user = User::from_update_fields(&fields)?;

        // An empty credential keeps the stored hash
        if !user.pwd_hash.is_empty() {
            user.pwd_hash = resolve_credential(Arc::clone(&self.hasher), user.pwd_hash).await?;
        }

        self.users.update(user).await?;
        Ok(Response::ok())
    }

    /// REMOVE_USER id,id,...
    async fn cmd_remove_user(&self, data: &str) -> CommandResult {
        let ids = Self::parse_ids("User id", data)?;
        let removed = self.users.remove_by_keys(ids).await?;
        Ok(Response::success(removed.to_string()))
    }

    // ========================================================================
    // Product Commands
    // ========================================================================

    /// GET_ALL_PRODUCTS
    async fn cmd_get_all_products(&self) -> CommandResult {
        let products = self.products.get_all().await?;
        Ok(Self::list_response(&products))
    }

    /// GET_LOW_STOCK_PRODUCTS
    async fn cmd_get_low_stock_products(&self) -> CommandResult {
        let products = self.products.get_low_stock().await?;
        Ok(Self::list_response(&products))
    }

    /// ADD_PRODUCT sku|brand|name|description|quantity|price|imageUrl
    async fn cmd_add_product(&self, data: &str) -> CommandResult {
        let product = Self::parse_product(data)?;
        self.products.add_one(product).await?;
        Ok(Response::ok())
    }

    /// UPDATE_PRODUCT sku|brand|name|description|quantity|price|imageUrl
    async fn cmd_update_product(&self, data: &str) -> CommandResult {
        let product = Self::parse_product(data)?;
        self.products.update(product).await?;
        Ok(Response::ok())
    }

    /// REMOVE_PRODUCT sku,sku,...
    async fn cmd_remove_product(&self, data: &str) -> CommandResult {
        let skus = split_keys(data)?
            .into_iter()
            .map(str::to_string)
            .collect();
        let removed = self.products.remove_by_keys(skus).await?;
        Ok(Response::success(removed.to_string()))
    }

    /// BULK_ADD_PRODUCTS record<RS>record<RS>...
    async fn cmd_bulk_add_products(&self, data: &str) -> CommandResult {
        let products = split_records(data)?
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                Self::parse_product(record).map_err(|e| CommandError::BatchRecord {
                    index: i + 1,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let count = self.products.add_many(products).await?;
        info!(count, "Bulk product import committed");
        Ok(Response::success(format!(
            "{count}{FIELD_DELIMITER}Successfully added {count} products."
        )))
    }

    // ========================================================================
    // Supplier Commands
    // ========================================================================

    /// GET_ALL_SUPPLIERS
    async fn cmd_get_all_suppliers(&self) -> CommandResult {
        let suppliers = self.suppliers.get_all().await?;
        Ok(Self::list_response(&suppliers))
    }

    /// ADD_SUPPLIER [|]company|contactName|phone|email|address|notes
    ///
    /// A leading `|` is an empty id field and is dropped; the store assigns the id.
    async fn cmd_add_supplier(&self, data: &str) -> CommandResult {
        let data = data.strip_prefix(FIELD_DELIMITER).unwrap_or(data);

        let mut record = Vec::with_capacity(SUPPLIER_FIELDS);
        record.push("");
        record.extend(split_fields(data, SUPPLIER_FIELDS - 1)?);

        let supplier = Supplier::from_fields(&record)?;
        let id = self.suppliers.add_one(supplier).await?;
        debug!(supplier_id = id, "Supplier created");
        Ok(Response::ok())
    }

    /// UPDATE_SUPPLIER id|company|contactName|phone|email|address|notes
    async fn cmd_update_supplier(&self, data: &str) -> CommandResult {
        let fields = split_fields(data, SUPPLIER_FIELDS)?;
        let supplier = Supplier::from_fields(&fields)?;
        if supplier.id.is_none() {
            return Err(FieldError::Missing {
                field: "Supplier id",
            }
            .into());
        }

        self.suppliers.update(supplier).await?;
        Ok(Response::ok())
    }

    /// REMOVE_SUPPLIER id,id,...
    async fn cmd_remove_supplier(&self, data: &str) -> CommandResult {
        let ids = Self::parse_ids("Supplier id", data)?;
        let removed = self.suppliers.remove_by_keys(ids).await?;
        Ok(Response::success(removed.to_string()))
    }
}
