//! Customers (`clientes`). A single shape serves both the counter sales and
//! the credit ledger: `tipo_cliente = credito` customers carry a credit limit
//! and a running balance that sales on credit and payments move.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bigdecimal::{BigDecimal, Zero};
use diesel::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

use crate::core::shared::schema::clientes;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{money, require_non_empty, with_conn};
use crate::core::shared::ApiError;

const CLIENTE_NOT_FOUND: &str = "Cliente no encontrado";

static RFC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-ZÑ&0-9]{12,13}$").expect("Invalid RFC regex"));

pub const TIPO_NORMAL: &str = "normal";
pub const TIPO_CREDITO: &str = "credito";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = clientes, primary_key(id_cliente))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Cliente {
    pub id_cliente: i32,
    pub nombre: String,
    pub direccion: String,
    pub telefono: String,
    pub email: String,
    pub rfc: String,
    pub tipo_cliente: String,
    pub limite_credito: BigDecimal,
    pub saldo_actual: BigDecimal,
    pub activo: bool,
}

impl Cliente {
    pub fn is_credit_customer(&self) -> bool {
        self.tipo_cliente == TIPO_CREDITO
    }

    /// Credit still available before reaching `limite_credito`.
    pub fn available_credit(&self) -> BigDecimal {
        &self.limite_credito - &self.saldo_actual
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = clientes)]
pub struct NewCliente {
    pub nombre: String,
    pub direccion: String,
    pub telefono: String,
    pub email: String,
    pub rfc: String,
    pub tipo_cliente: String,
    pub limite_credito: BigDecimal,
    pub saldo_actual: BigDecimal,
    pub activo: bool,
}

#[derive(Debug, Default, PartialEq, AsChangeset)]
#[diesel(table_name = clientes)]
pub struct ClienteChanges {
    pub nombre: Option<String>,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub rfc: Option<String>,
    pub tipo_cliente: Option<String>,
    pub limite_credito: Option<BigDecimal>,
    pub activo: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClienteRequest {
    pub nombre: String,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub rfc: Option<String>,
    pub tipo_cliente: Option<String>,
    pub limite_credito: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClienteRequest {
    pub nombre: Option<String>,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub rfc: Option<String>,
    pub tipo_cliente: Option<String>,
    pub limite_credito: Option<f64>,
    pub activo: Option<bool>,
}

/// Upper-cases and validates an RFC. An empty value is allowed.
pub fn normalize_rfc(raw: &str) -> Result<String, ApiError> {
    let rfc = raw.trim().to_uppercase();
    if rfc.is_empty() || RFC_REGEX.is_match(&rfc) {
        Ok(rfc)
    } else {
        Err(ApiError::validation(format!("RFC inválido: {rfc}")))
    }
}

pub fn validate_tipo_cliente(raw: &str) -> Result<String, ApiError> {
    let tipo = raw.trim().to_lowercase();
    match tipo.as_str() {
        TIPO_NORMAL | TIPO_CREDITO => Ok(tipo),
        _ => Err(ApiError::validation(format!(
            "Tipo de cliente inválido: '{raw}' (se espera 'normal' o 'credito')"
        ))),
    }
}

impl CreateClienteRequest {
    pub fn into_new(self) -> Result<NewCliente, ApiError> {
        require_non_empty(&self.nombre, "nombre")?;
        Ok(NewCliente {
            nombre: self.nombre.trim().to_string(),
            direccion: self.direccion.unwrap_or_default(),
            telefono: self.telefono.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            rfc: normalize_rfc(self.rfc.as_deref().unwrap_or_default())?,
            tipo_cliente: match self.tipo_cliente.as_deref() {
                Some(tipo) => validate_tipo_cliente(tipo)?,
                None => TIPO_NORMAL.to_string(),
            },
            limite_credito: match self.limite_credito {
                Some(v) => money(v, "limite_credito")?,
                None => BigDecimal::zero(),
            },
            saldo_actual: BigDecimal::zero(),
            activo: true,
        })
    }
}

impl UpdateClienteRequest {
    pub fn into_changes(self) -> Result<ClienteChanges, ApiError> {
        if let Some(nombre) = &self.nombre {
            require_non_empty(nombre, "nombre")?;
        }
        Ok(ClienteChanges {
            nombre: self.nombre.map(|n| n.trim().to_string()),
            direccion: self.direccion,
            telefono: self.telefono,
            email: self.email,
            rfc: self.rfc.as_deref().map(normalize_rfc).transpose()?,
            tipo_cliente: self
                .tipo_cliente
                .as_deref()
                .map(validate_tipo_cliente)
                .transpose()?,
            limite_credito: self
                .limite_credito
                .map(|v| money(v, "limite_credito"))
                .transpose()?,
            activo: self.activo,
        })
    }
}

pub fn find_cliente(conn: &mut PgConnection, id: i32) -> Result<Cliente, ApiError> {
    clientes::table
        .find(id)
        .select(Cliente::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found(CLIENTE_NOT_FOUND))
}

pub async fn list_clientes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Cliente>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(clientes::table
            .order(clientes::id_cliente.asc())
            .select(Cliente::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_cliente(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<Cliente>, ApiError> {
    let item = with_conn(&state.conn, move |conn| find_cliente(conn, id)).await?;
    Ok(Json(item))
}

pub async fn create_cliente(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateClienteRequest>,
) -> Result<(StatusCode, Json<Cliente>), ApiError> {
    let new = req.into_new()?;
    let item = with_conn(&state.conn, move |conn| {
        Ok(diesel::insert_into(clientes::table)
            .values(&new)
            .returning(Cliente::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_cliente(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateClienteRequest>,
) -> Result<Json<Cliente>, ApiError> {
    let changes = req.into_changes()?;
    let item = with_conn(&state.conn, move |conn| {
        if changes == ClienteChanges::default() {
            return find_cliente(conn, id);
        }
        diesel::update(clientes::table.find(id))
            .set(&changes)
            .returning(Cliente::as_returning())
            .get_result(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(CLIENTE_NOT_FOUND))
    })
    .await?;
    Ok(Json(item))
}

pub async fn delete_cliente(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state.conn, move |conn| {
        let deleted = diesel::delete(clientes::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::not_found(CLIENTE_NOT_FOUND));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_customers_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/clientes", get(list_clientes).post(create_cliente))
        .route(
            "/api/clientes/:id",
            get(get_cliente).put(update_cliente).delete(delete_cliente),
        )
}
