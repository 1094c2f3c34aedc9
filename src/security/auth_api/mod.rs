//! Bearer-token authentication for the REST API: the request middleware,
//! the `AuthenticatedUser`/`AdminUser` extractors and the role model of the
//! `usuarios` table.

pub mod config;
pub mod error;
pub mod middleware;
pub mod types;
pub mod utils;

pub use config::AuthConfig;
pub use error::AuthError;
pub use middleware::auth_middleware;
pub use types::{AdminUser, AuthenticatedUser, Role};
pub use utils::extract_user_from_headers;
