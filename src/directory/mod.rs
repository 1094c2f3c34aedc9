//! User accounts. Passwords are stored as argon2 PHC strings and never leave
//! the server.

pub mod users;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::shared::schema::usuarios;
use crate::core::shared::ApiError;
use crate::security::auth_api::Role;

pub use users::configure_users_routes;

pub const USUARIO_NOT_FOUND: &str = "Usuario no encontrado";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = usuarios, primary_key(id_usuario))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Usuario {
    pub id_usuario: i32,
    pub nombre: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub rol: String,
    pub activo: bool,
    pub fecha_creacion: DateTime<Utc>,
    pub fecha_actualizacion: DateTime<Utc>,
}

impl Usuario {
    pub fn role(&self) -> Role {
        self.rol.parse().unwrap_or(Role::Anonymous)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = usuarios)]
pub struct NewUsuario {
    pub nombre: String,
    pub email: String,
    pub password: String,
    pub rol: String,
}

#[derive(Debug, Default, PartialEq, AsChangeset)]
#[diesel(table_name = usuarios)]
pub struct UsuarioChanges {
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub rol: Option<String>,
    pub activo: Option<bool>,
    pub fecha_actualizacion: Option<DateTime<Utc>>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Parses a role that can be stored on an account.
pub fn parse_assignable_role(raw: &str) -> Result<Role, ApiError> {
    let role: Role = raw.parse().map_err(ApiError::validation)?;
    if !role.is_assignable() {
        return Err(ApiError::validation(format!("Rol inválido: '{raw}'")));
    }
    Ok(role)
}

pub fn find_usuario(conn: &mut PgConnection, id: i32) -> Result<Usuario, ApiError> {
    usuarios::table
        .find(id)
        .select(Usuario::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(USUARIO_NOT_FOUND))
}

pub fn find_by_email(conn: &mut PgConnection, email: &str) -> QueryResult<Option<Usuario>> {
    usuarios::table
        .filter(usuarios::email.eq(email))
        .select(Usuario::as_select())
        .first(conn)
        .optional()
}

pub fn email_taken(
    conn: &mut PgConnection,
    email: &str,
    except: Option<i32>,
) -> QueryResult<bool> {
    let mut query = usuarios::table
        .filter(usuarios::email.eq(email))
        .select(usuarios::id_usuario)
        .into_boxed();
    if let Some(id) = except {
        query = query.filter(usuarios::id_usuario.ne(id));
    }
    Ok(query.first::<i32>(conn).optional()?.is_some())
}
