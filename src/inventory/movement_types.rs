use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::stock::MovementKind;
use crate::core::shared::schema::tipos_movimiento;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::shared::ApiError;

const TIPO_MOVIMIENTO_NOT_FOUND: &str = "Tipo de movimiento no encontrado";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = tipos_movimiento, primary_key(id_tipo_movimiento))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TipoMovimiento {
    pub id_tipo_movimiento: i32,
    pub tipo: String,
}

impl TipoMovimiento {
    pub fn kind(&self) -> Result<MovementKind, ApiError> {
        self.tipo.parse().map_err(ApiError::Validation)
    }
}

#[derive(Debug, Deserialize)]
pub struct TipoMovimientoRequest {
    pub tipo: Option<String>,
}

fn parse_kind(raw: Option<&str>) -> Result<MovementKind, ApiError> {
    raw.unwrap_or_default()
        .parse::<MovementKind>()
        .map_err(ApiError::Validation)
}

pub async fn list_tipos_movimiento(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TipoMovimiento>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(tipos_movimiento::table
            .order(tipos_movimiento::id_tipo_movimiento.asc())
            .select(TipoMovimiento::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_tipo_movimiento(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<TipoMovimiento>, ApiError> {
    let item = with_conn(&state.conn, move |conn| {
        tipos_movimiento::table
            .find(id)
            .select(TipoMovimiento::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(TIPO_MOVIMIENTO_NOT_FOUND))
    })
    .await?;
    Ok(Json(item))
}

pub async fn create_tipo_movimiento(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TipoMovimientoRequest>,
) -> Result<(StatusCode, Json<TipoMovimiento>), ApiError> {
    let kind = parse_kind(req.tipo.as_deref())?;
    let item = with_conn(&state.conn, move |conn| {
        Ok(diesel::insert_into(tipos_movimiento::table)
            .values(tipos_movimiento::tipo.eq(kind.as_str()))
            .returning(TipoMovimiento::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_tipo_movimiento(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<TipoMovimientoRequest>,
) -> Result<Json<TipoMovimiento>, ApiError> {
    let kind = req
        .tipo
        .as_deref()
        .map(|t| parse_kind(Some(t)))
        .transpose()?;
    let item = with_conn(&state.conn, move |conn| {
        let current = tipos_movimiento::table
            .find(id)
            .select(TipoMovimiento::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found(TIPO_MOVIMIENTO_NOT_FOUND))?;
        let Some(kind) = kind else {
            return Ok(current);
        };
        Ok(diesel::update(tipos_movimiento::table.find(id))
            .set(tipos_movimiento::tipo.eq(kind.as_str()))
            .returning(TipoMovimiento::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok(Json(item))
}

pub async fn delete_tipo_movimiento(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    with_conn(&state.conn, move |conn| {
        let deleted = diesel::delete(tipos_movimiento::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::not_found(TIPO_MOVIMIENTO_NOT_FOUND));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_movement_types_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/tipos-movimiento",
            get(list_tipos_movimiento).post(create_tipo_movimiento),
        )
        .route(
            "/api/tipos-movimiento/:id",
            get(get_tipo_movimiento)
                .put(update_tipo_movimiento)
                .delete(delete_tipo_movimiento),
        )
}
