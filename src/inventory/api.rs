use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use bigdecimal::BigDecimal;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use super::stock::{apply_delta, set_absolute};
use super::{
    load_inventario, lock_inventario, save_stock, Inventario, InventarioDetalle,
    InventarioFilter, NewInventario,
};
use crate::core::shared::schema::inventario;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{bd, check_numeric, with_conn};
use crate::core::shared::ApiError;

const INVENTARIO_NOT_FOUND: &str = "Registro de inventario no encontrado";
const INVENTARIO_DUPLICADO: &str =
    "Ya existe un registro de inventario para este producto en esta sucursal";

#[derive(Debug, Deserialize)]
pub struct CreateInventarioRequest {
    pub id_producto: i32,
    pub id_sucursal: i32,
    #[serde(default)]
    pub stock: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStockRequest {
    pub stock: f64,
}

#[derive(Debug, Deserialize)]
pub struct AjusteStockRequest {
    pub cantidad: f64,
}

fn quantity(val: f64, field: &str) -> Result<BigDecimal, ApiError> {
    if !val.is_finite() {
        return Err(ApiError::validation(format!(
            "El campo {field} debe ser numérico"
        )));
    }
    let value = bd(val).round(2);
    check_numeric(&value, field)?;
    Ok(value)
}

pub async fn list_inventario(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<InventarioDetalle>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(load_inventario(conn, InventarioFilter::Todos)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_inventario_by_sucursal(
    State(state): State<Arc<AppState>>,
    Path(sucursal_id): Path<i32>,
) -> Result<Json<Vec<InventarioDetalle>>, ApiError> {
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_inventario(conn, InventarioFilter::Sucursal(sucursal_id))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_inventario_by_producto(
    State(state): State<Arc<AppState>>,
    Path(producto_id): Path<i32>,
) -> Result<Json<Vec<InventarioDetalle>>, ApiError> {
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_inventario(conn, InventarioFilter::Producto(producto_id))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_inventario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<InventarioDetalle>, ApiError> {
    let item = with_conn(&state.conn, move |conn| {
        load_inventario(conn, InventarioFilter::Id(id))?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found(INVENTARIO_NOT_FOUND))
    })
    .await?;
    Ok(Json(item))
}

pub async fn create_inventario(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateInventarioRequest>,
) -> Result<(StatusCode, Json<Inventario>), ApiError> {
    let stock = set_absolute(&quantity(req.stock, "stock")?)?;
    let item = with_conn(&state.conn, move |conn| {
        let exists: bool = diesel::select(diesel::dsl::exists(
            inventario::table
                .filter(inventario::id_producto.eq(req.id_producto))
                .filter(inventario::id_sucursal.eq(req.id_sucursal)),
        ))
        .get_result(conn)?;
        if exists {
            return Err(ApiError::bad_request(INVENTARIO_DUPLICADO));
        }
        diesel::insert_into(inventario::table)
            .values(&NewInventario {
                id_producto: req.id_producto,
                id_sucursal: req.id_sucursal,
                stock,
            })
            .returning(Inventario::as_returning())
            .get_result(conn)
            .map_err(|e| match ApiError::from(e) {
                ApiError::Conflict(_) => ApiError::bad_request(INVENTARIO_DUPLICADO),
                other => other,
            })
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_stock(
    State(state): State<Arc<AppState>>,
    Path((producto_id, sucursal_id)): Path<(i32, i32)>,
    Json(req): Json<UpdateStockRequest>,
) -> Result<Json<Inventario>, ApiError> {
    let stock = set_absolute(&quantity(req.stock, "stock")?)?;
    let item = with_conn(&state.conn, move |conn| {
        conn.transaction(|conn| {
            let row = lock_inventario(conn, producto_id, sucursal_id)?
                .ok_or_else(|| ApiError::not_found(INVENTARIO_NOT_FOUND))?;
            Ok(save_stock(conn, row.id_inventario, &stock)?)
        })
    })
    .await?;
    Ok(Json(item))
}

pub async fn ajustar_stock(
    State(state): State<Arc<AppState>>,
    Path((producto_id, sucursal_id)): Path<(i32, i32)>,
    Json(req): Json<AjusteStockRequest>,
) -> Result<Json<Inventario>, ApiError> {
    let delta = quantity(req.cantidad, "cantidad")?;
    let item = with_conn(&state.conn, move |conn| {
        conn.transaction(|conn| {
            let row = lock_inventario(conn, producto_id, sucursal_id)?
                .ok_or_else(|| ApiError::not_found(INVENTARIO_NOT_FOUND))?;
            let next = apply_delta(&row.stock, &delta)?;
            log::info!(
                "Ajuste de stock producto={producto_id} sucursal={sucursal_id}: {} -> {next}",
                row.stock
            );
            Ok(save_stock(conn, row.id_inventario, &next)?)
        })
    })
    .await?;
    Ok(Json(item))
}

pub fn configure_inventory_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/inventario", get(list_inventario).post(create_inventario))
        .route(
            "/api/inventario/sucursal/:sucursal_id",
            get(list_inventario_by_sucursal),
        )
        .route(
            "/api/inventario/producto/:producto_id",
            get(list_inventario_by_producto),
        )
        .route("/api/inventario/:id", get(get_inventario))
        // `:id` is the product id on the next two routes; the router needs one
        // parameter name per segment.
        .route(
            "/api/inventario/:id/sucursal/:sucursal_id/stock",
            put(update_stock),
        )
        .route(
            "/api/inventario/:id/sucursal/:sucursal_id/ajuste",
            put(ajustar_stock),
        )
}
