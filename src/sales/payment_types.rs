use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::shared::schema::tipos_pago;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{require_non_empty, with_conn};
use crate::core::shared::ApiError;

const TIPO_PAGO_NOT_FOUND: &str = "Tipo de pago no encontrado";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = tipos_pago, primary_key(id_tipo_pago))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TipoPago {
    pub id_tipo_pago: i32,
    pub tipo_pago: String,
}

#[derive(Debug, Deserialize)]
pub struct TipoPagoRequest {
    pub tipo_pago: Option<String>,
}

pub async fn list_tipos_pago(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TipoPago>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(tipos_pago::table
            .order(tipos_pago::id_tipo_pago.asc())
            .select(TipoPago::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_tipo_pago(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<TipoPago>, ApiError> {
    let item = with_conn(&state.conn, move |conn| {
        tipos_pago::table
            .find(id)
            .select(TipoPago::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(TIPO_PAGO_NOT_FOUND))
    })
    .await?;
    Ok(Json(item))
}

pub async fn create_tipo_pago(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TipoPagoRequest>,
) -> Result<(StatusCode, Json<TipoPago>), ApiError> {
    let tipo = req.tipo_pago.unwrap_or_default();
    require_non_empty(&tipo, "tipo_pago")?;
    let item = with_conn(&state.conn, move |conn| {
        Ok(diesel::insert_into(tipos_pago::table)
            .values(tipos_pago::tipo_pago.eq(tipo.trim()))
            .returning(TipoPago::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_tipo_pago(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<TipoPagoRequest>,
) -> Result<Json<TipoPago>, ApiError> {
    let item = with_conn(&state.conn, move |conn| {
        let current = tipos_pago::table
            .find(id)
            .select(TipoPago::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(TIPO_PAGO_NOT_FOUND))?;
        let Some(tipo) = req.tipo_pago else {
            return Ok(current);
        };
        require_non_empty(&tipo, "tipo_pago")?;
        Ok(diesel::update(tipos_pago::table.find(id))
            .set(tipos_pago::tipo_pago.eq(tipo.trim()))
            .returning(TipoPago::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok(Json(item))
}

pub async fn delete_tipo_pago(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state.conn, move |conn| {
        let deleted = diesel::delete(tipos_pago::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::not_found(TIPO_PAGO_NOT_FOUND));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_payment_types_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tipos-pago", get(list_tipos_pago).post(create_tipo_pago))
        .route(
            "/api/tipos-pago/:id",
            get(get_tipo_pago)
                .put(update_tipo_pago)
                .delete(delete_tipo_pago),
        )
}
