//! Proxy for the Factura.com CFDI 4.0 API.
//!
//! Requests are forwarded with the account credentials from
//! [`crate::core::config::FacturaConfig`] and upstream failures are mapped to
//! `{"status":"error","message":...}` bodies.

pub mod api;
pub mod factura;

pub use api::configure_invoicing_routes;
pub use factura::{FacturaClient, FacturaError};
