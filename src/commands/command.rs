//! The static command table.

use std::fmt;

/// Every command the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Users
    Login,
    Signup,
    GetAllUsers,
    UpdateUser,
    RemoveUser,

    // Products
    GetAllProducts,
    GetLowStockProducts,
    AddProduct,
    UpdateProduct,
    RemoveProduct,
    BulkAddProducts,

    // Suppliers
    GetAllSuppliers,
    AddSupplier,
    UpdateSupplier,
    RemoveSupplier,
}

impl Command {
    /// All commands, in table order.
    pub const ALL: [Command; 15] = [
        Command::Login,
        Command::Signup,
        Command::GetAllUsers,
        Command::UpdateUser,
        Command::RemoveUser,
        Command::GetAllProducts,
        Command::GetLowStockProducts,
        Command::AddProduct,
        Command::UpdateProduct,
        Command::RemoveProduct,
        Command::BulkAddProducts,
        Command::GetAllSuppliers,
        Command::AddSupplier,
        Command::UpdateSupplier,
        Command::RemoveSupplier,
    ];

    /// Resolves a command verb, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(name))
    }

    /// The canonical wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login => "LOGIN",
            Command::Signup => "SIGNUP",
            Command::GetAllUsers => "GET_ALL_USERS",
            Command::UpdateUser => "UPDATE_USER",
            Command::RemoveUser => "REMOVE_USER",
            Command::GetAllProducts => "GET_ALL_PRODUCTS",
            Command::GetLowStockProducts => "GET_LOW_STOCK_PRODUCTS",
            Command::AddProduct => "ADD_PRODUCT",
            Command::UpdateProduct => "UPDATE_PRODUCT",
            Command::RemoveProduct => "REMOVE_PRODUCT",
            Command::BulkAddProducts => "BULK_ADD_PRODUCTS",
            Command::GetAllSuppliers => "GET_ALL_SUPPLIERS",
            Command::AddSupplier => "ADD_SUPPLIER",
            Command::UpdateSupplier => "UPDATE_SUPPLIER",
            Command::RemoveSupplier => "REMOVE_SUPPLIER",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
