//! Inventory, sales and invoicing backend for the Baterías branches.

pub mod branches;
pub mod core;
pub mod credits;
pub mod customers;
pub mod directory;
pub mod inventory;
#[cfg(feature = "invoicing")]
pub mod invoicing;
pub mod main_module;
pub mod products;
pub mod sales;
pub mod security;
pub mod transfers;
