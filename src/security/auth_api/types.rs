use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{error::AuthError, utils::extract_user_from_headers};
use crate::core::shared::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Anonymous,
    Vendedor,
    Inventario,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Vendedor => "vendedor",
            Self::Inventario => "inventario",
            Self::Admin => "admin",
        }
    }

    /// Roles that can be stored on a `usuarios` row.
    pub fn is_assignable(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "vendedor" => Ok(Self::Vendedor),
            "inventario" => Ok(Self::Inventario),
            "anonymous" => Ok(Self::Anonymous),
            other => Err(format!(
                "Rol inválido: '{other}' (se espera admin, vendedor o inventario)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: i32,
    pub email: String,
    pub role: Role,
}

impl Default for AuthenticatedUser {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl AuthenticatedUser {
    pub fn new(user_id: i32, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            email: email.into(),
            role,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: 0,
            email: String::new(),
            role: Role::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.role != Role::Anonymous
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Resolves the caller from the request extensions set by
/// [`super::middleware::auth_middleware`], falling back to the bearer token
/// so routes stay protected when the middleware lets anonymous calls through.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            if user.is_authenticated() {
                return Ok(user.clone());
            }
        }
        extract_user_from_headers(&parts.headers, &state.auth, &state.jwt)
    }
}

/// An authenticated caller with the `admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(AdminUser(user))
    }
}
