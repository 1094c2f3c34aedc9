use axum::http::{header, HeaderMap};

use super::{config::AuthConfig, error::AuthError, types::AuthenticatedUser};
use crate::security::jwt::JwtManager;

pub fn extract_user_from_headers(
    headers: &HeaderMap,
    config: &AuthConfig,
    jwt: &JwtManager,
) -> Result<AuthenticatedUser, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = auth_header
        .strip_prefix(config.bearer_prefix.as_str())
        .or_else(|| crate::security::jwt::extract_bearer_token(auth_header))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let claims = jwt.validate_token(token)?;
    let user_id = claims.user_id()?;
    let role = claims.role();
    if !role.is_assignable() {
        return Err(AuthError::InvalidToken);
    }

    Ok(AuthenticatedUser::new(user_id, claims.email, role))
}
