//! Process entry points split from main.rs: HTTP server, health checks and
//! the command line.

mod cli;
mod health;
mod server;
mod shutdown;

pub use cli::*;
pub use health::*;
pub use server::*;
pub use shutdown::*;
