use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use log::debug;
use std::sync::Arc;

use super::{error::AuthError, types::AuthenticatedUser, utils::extract_user_from_headers};
use crate::core::shared::state::AppState;

/// Attaches an [`AuthenticatedUser`] to every request. Without a valid token
/// the caller is anonymous unless `require_auth` is set, in which case only
/// public and anonymous paths go through.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let path = request.uri().path().to_string();
    let config = &state.auth;

    if config.is_public_path(&path) || config.is_anonymous_allowed(&path) {
        request
            .extensions_mut()
            .insert(AuthenticatedUser::anonymous());
        return Ok(next.run(request).await);
    }

    match extract_user_from_headers(request.headers(), config, &state.jwt) {
        Ok(user) => {
            debug!("Authenticated user={} rol={}", user.user_id, user.role);
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(e) => {
            if !config.require_auth {
                request
                    .extensions_mut()
                    .insert(AuthenticatedUser::anonymous());
                return Ok(next.run(request).await);
            }
            debug!("Rejected {path}: {e:?}");
            Err(e)
        }
    }
}
