use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    email_taken, find_by_email, find_usuario, normalize_email, parse_assignable_role,
    NewUsuario, Usuario, UsuarioChanges,
};
use crate::core::shared::schema::usuarios;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{blocking, require_non_empty, with_conn};
use crate::core::shared::ApiError;
use crate::security::auth_api::{AdminUser, AuthenticatedUser, Role};
use crate::security::password::{hash_password, validate_password, verify_password};

const EMAIL_TAKEN: &str = "El email ya está registrado";
const INVALID_CREDENTIALS: &str = "Credenciales inválidas";
const INACTIVE_USER: &str = "Usuario inactivo";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub nombre: String,
    pub email: String,
    pub password: String,
    pub rol: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUsuarioRequest {
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub rol: Option<String>,
    pub activo: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub usuario: Usuario,
    pub token: String,
}

fn hashed(password: &str) -> Result<String, ApiError> {
    validate_password(password).map_err(|issue| ApiError::validation(issue.message()))?;
    hash_password(password).map_err(|e| ApiError::Internal(e.to_string()))
}

impl RegisterRequest {
    /// Validates the payload and hashes the password.
    pub fn into_new(self) -> Result<NewUsuario, ApiError> {
        require_non_empty(&self.nombre, "nombre")?;
        require_non_empty(&self.email, "email")?;
        let rol = match self.rol.as_deref().filter(|r| !r.trim().is_empty()) {
            Some(raw) => parse_assignable_role(raw)?,
            None => Role::Vendedor,
        };
        Ok(NewUsuario {
            nombre: self.nombre.trim().to_string(),
            email: normalize_email(&self.email),
            password: hashed(&self.password)?,
            rol: rol.as_str().to_string(),
        })
    }
}

impl UpdateUsuarioRequest {
    /// Empty strings are treated as absent, like the legacy admin screen sends them.
    pub fn into_changes(self) -> Result<UsuarioChanges, ApiError> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let mut changes = UsuarioChanges {
            nombre: present(self.nombre).map(|n| n.trim().to_string()),
            email: present(self.email).map(|e| normalize_email(&e)),
            activo: self.activo,
            ..Default::default()
        };
        if let Some(password) = present(self.password) {
            changes.password = Some(hashed(&password)?);
        }
        if let Some(rol) = present(self.rol) {
            changes.rol = Some(parse_assignable_role(&rol)?.as_str().to_string());
        }
        if changes != UsuarioChanges::default() {
            changes.fecha_actualizacion = Some(Utc::now());
        }
        Ok(changes)
    }
}

fn issue_session(state: &AppState, usuario: Usuario) -> Result<SessionResponse, ApiError> {
    let issued = state
        .jwt
        .generate_token(usuario.id_usuario, &usuario.email, usuario.role())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(SessionResponse {
        usuario,
        token: issued.token,
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let new = blocking(move || req.into_new()).await?;
    let usuario = with_conn(&state.conn, move |conn| {
        if email_taken(conn, &new.email, None)? {
            return Err(ApiError::bad_request(EMAIL_TAKEN));
        }
        Ok(diesel::insert_into(usuarios::table)
            .values(&new)
            .returning(Usuario::as_returning())
            .get_result(conn)?)
    })
    .await?;
    info!("Registered user {} ({})", usuario.id_usuario, usuario.rol);
    let session = issue_session(&state, usuario)?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let usuario = with_conn(&state.conn, move |conn| {
        let email = normalize_email(&req.email);
        let Some(usuario) = find_by_email(conn, &email)? else {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
        };
        let valid = verify_password(&req.password, &usuario.password).unwrap_or_else(|e| {
            warn!("Stored hash for user {} is unusable: {e}", usuario.id_usuario);
            false
        });
        if !valid {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        if !usuario.activo {
            return Err(ApiError::Unauthorized(INACTIVE_USER.into()));
        }
        Ok(usuario)
    })
    .await?;
    Ok(Json(issue_session(&state, usuario)?))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Usuario>, ApiError> {
    let id = user.user_id;
    let usuario = with_conn(&state.conn, move |conn| find_usuario(conn, id)).await?;
    Ok(Json(usuario))
}

pub async fn list_usuarios(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Usuario>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(usuarios::table
            .select(Usuario::as_select())
            .order(usuarios::id_usuario.asc())
            .load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_usuario(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i32>,
) -> Result<Json<Usuario>, ApiError> {
    let usuario = with_conn(&state.conn, move |conn| find_usuario(conn, id)).await?;
    Ok(Json(usuario))
}

pub async fn update_usuario(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i32>,
    Json(req): Json<UpdateUsuarioRequest>,
) -> Result<Json<Usuario>, ApiError> {
    let changes = blocking(move || req.into_changes()).await?;
    let usuario = with_conn(&state.conn, move |conn| {
        let current = find_usuario(conn, id)?;
        if changes == UsuarioChanges::default() {
            return Ok(current);
        }
        if let Some(email) = changes.email.as_deref() {
            if email_taken(conn, email, Some(id))? {
                return Err(ApiError::bad_request(EMAIL_TAKEN));
            }
        }
        Ok(diesel::update(usuarios::table.find(id))
            .set(&changes)
            .returning(Usuario::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok(Json(usuario))
}

/// Deactivates the account; rows are kept for sale history.
pub async fn delete_usuario(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state.conn, move |conn| {
        find_usuario(conn, id)?;
        diesel::update(usuarios::table.find(id))
            .set((
                usuarios::activo.eq(false),
                usuarios::fecha_actualizacion.eq(Utc::now()),
            ))
            .execute(conn)?;
        Ok(())
    })
    .await?;
    info!("User {id} deactivated by {}", admin.email);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/usuarios/register", post(register))
        .route("/api/usuarios/login", post(login))
        .route("/api/usuarios/me", get(me))
        .route("/api/usuarios", get(list_usuarios))
        .route(
            "/api/usuarios/:id",
            get(get_usuario).put(update_usuario).delete(delete_usuario),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::test_state;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn test_register_defaults_to_vendedor_and_hashes() {
        let req = RegisterRequest {
            nombre: " Luis ".into(),
            email: "Luis@Baterias.mx".into(),
            password: "bateria123".into(),
            rol: None,
        };
        let new = req.into_new().unwrap();
        assert_eq!(new.rol, "vendedor");
        assert_eq!(new.nombre, "Luis");
        assert_eq!(new.email, "luis@baterias.mx");
        assert!(verify_password("bateria123", &new.password).unwrap());
    }

    #[test]
    fn test_register_rejects_short_password_and_bad_role() {
        let short = RegisterRequest {
            nombre: "Luis".into(),
            email: "l@b.mx".into(),
            password: "abc".into(),
            rol: None,
        };
        assert!(matches!(short.into_new(), Err(ApiError::Validation(_))));

        let bad_role = RegisterRequest {
            nombre: "Luis".into(),
            email: "l@b.mx".into(),
            password: "bateria123".into(),
            rol: Some("gerente".into()),
        };
        assert!(matches!(bad_role.into_new(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_update_rehashes_password_and_skips_blanks() {
        let req = UpdateUsuarioRequest {
            nombre: Some("".into()),
            password: Some("nueva-clave".into()),
            rol: Some("admin".into()),
            ..Default::default()
        };
        let changes = req.into_changes().unwrap();
        assert_eq!(changes.nombre, None);
        assert_eq!(changes.rol.as_deref(), Some("admin"));
        assert!(verify_password("nueva-clave", changes.password.as_deref().unwrap()).unwrap());
        assert!(changes.fecha_actualizacion.is_some());

        let empty = UpdateUsuarioRequest::default().into_changes().unwrap();
        assert_eq!(empty, UsuarioChanges::default());
    }

    #[tokio::test]
    async fn test_admin_routes_reject_anonymous_and_vendedor() {
        let state = test_state();
        let app = configure_users_routes().with_state(state.clone());

        let response = app
            .clone()
            .oneshot(Request::get("/api/usuarios").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let token = state
            .jwt
            .generate_token(5, "v@baterias.mx", Role::Vendedor)
            .unwrap()
            .token;
        let response = app
            .oneshot(
                Request::delete("/api/usuarios/9")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_register_validates_before_touching_database() {
        let app = configure_users_routes().with_state(test_state());
        let response = app
            .oneshot(
                Request::post("/api/usuarios/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"nombre":"Ana","email":"ana@b.mx","password":"123"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value["error"],
            "La contraseña debe tener al menos 6 caracteres"
        );
    }

    #[tokio::test]
    async fn test_update_validates_password_before_touching_database() {
        let state = test_state();
        let token = state
            .jwt
            .generate_token(1, "admin@baterias.mx", Role::Admin)
            .unwrap()
            .token;
        let app = configure_users_routes().with_state(state);
        let response = app
            .oneshot(
                Request::put("/api/usuarios/9")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"password":"abc"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value["error"],
            "La contraseña debe tener al menos 6 caracteres"
        );
    }
}
