use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::movement_types::TipoMovimiento;
use super::stock::apply_movement;
use super::{require_inventario, save_stock};
use crate::branches::Sucursal;
use crate::core::shared::schema::{
    movimientos_inventario, productos, sucursales, tipos_movimiento,
};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{parse_date_range, with_conn};
use crate::core::shared::ApiError;
use crate::products::Producto;

const MOVIMIENTO_NOT_FOUND: &str = "Movimiento de inventario no encontrado";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = movimientos_inventario, primary_key(id_movimiento))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MovimientoInventario {
    pub id_movimiento: i32,
    pub id_producto: i32,
    pub id_sucursal: i32,
    pub fecha: DateTime<Utc>,
    pub id_tipo_movimiento: i32,
    pub cantidad: i32,
    pub referencia: Option<String>,
    pub observaciones: Option<String>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = movimientos_inventario)]
pub struct NewMovimiento {
    pub id_producto: i32,
    pub id_sucursal: i32,
    #[serde(skip, default = "Utc::now")]
    pub fecha: DateTime<Utc>,
    pub id_tipo_movimiento: i32,
    pub cantidad: i32,
    pub referencia: Option<String>,
    pub observaciones: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovimientoDetalle {
    #[serde(flatten)]
    pub movimiento: MovimientoInventario,
    pub producto: Producto,
    pub sucursal: Sucursal,
    #[serde(rename = "tipoMovimiento")]
    pub tipo_movimiento: TipoMovimiento,
}

#[derive(Debug, Deserialize)]
pub struct FechaQuery {
    #[serde(rename = "fechaInicio")]
    pub fecha_inicio: Option<String>,
    #[serde(rename = "fechaFin")]
    pub fecha_fin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovimientoFilter {
    Todos,
    Sucursal(i32),
    Producto(i32),
    Id(i32),
    Rango(DateTime<Utc>, DateTime<Utc>),
}

pub fn load_movimientos(
    conn: &mut PgConnection,
    filter: MovimientoFilter,
) -> QueryResult<Vec<MovimientoDetalle>> {
    let mut query = movimientos_inventario::table
        .inner_join(productos::table)
        .inner_join(sucursales::table)
        .inner_join(tipos_movimiento::table)
        .select((
            MovimientoInventario::as_select(),
            Producto::as_select(),
            Sucursal::as_select(),
            TipoMovimiento::as_select(),
        ))
        .into_boxed();

    query = match filter {
        MovimientoFilter::Todos => query,
        MovimientoFilter::Sucursal(id) => {
            query.filter(movimientos_inventario::id_sucursal.eq(id))
        }
        MovimientoFilter::Producto(id) => {
            query.filter(movimientos_inventario::id_producto.eq(id))
        }
        MovimientoFilter::Id(id) => query.filter(movimientos_inventario::id_movimiento.eq(id)),
        MovimientoFilter::Rango(desde, hasta) => query
            .filter(movimientos_inventario::fecha.ge(desde))
            .filter(movimientos_inventario::fecha.le(hasta)),
    };

    let rows: Vec<(MovimientoInventario, Producto, Sucursal, TipoMovimiento)> = query
        .order((
            movimientos_inventario::fecha.desc(),
            movimientos_inventario::id_movimiento.desc(),
        ))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(movimiento, producto, sucursal, tipo_movimiento)| MovimientoDetalle {
            movimiento,
            producto,
            sucursal,
            tipo_movimiento,
        })
        .collect())
}

fn first_movimiento(conn: &mut PgConnection, id: i32) -> Result<MovimientoDetalle, ApiError> {
    load_movimientos(conn, MovimientoFilter::Id(id))?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(MOVIMIENTO_NOT_FOUND))
}

/// Applies a movement to the branch stock and records it. The caller owns
/// the transaction.
pub fn register_movimiento(
    conn: &mut PgConnection,
    new: &NewMovimiento,
) -> Result<MovimientoInventario, ApiError> {
    if new.cantidad <= 0 {
        return Err(ApiError::validation("La cantidad debe ser mayor que cero"));
    }

    let row = require_inventario(conn, new.id_producto, new.id_sucursal)?;

    let tipo: TipoMovimiento = tipos_movimiento::table
        .find(new.id_tipo_movimiento)
        .select(TipoMovimiento::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "Tipo de movimiento con ID {} no encontrado",
                new.id_tipo_movimiento
            ))
        })?;

    let next = apply_movement(tipo.kind()?, &row.stock, new.cantidad, new.id_producto)?;
    save_stock(conn, row.id_inventario, &next)?;

    Ok(diesel::insert_into(movimientos_inventario::table)
        .values(new)
        .returning(MovimientoInventario::as_returning())
        .get_result(conn)?)
}

pub async fn list_movimientos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MovimientoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(load_movimientos(conn, MovimientoFilter::Todos)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_movimientos_by_sucursal(
    State(state): State<Arc<AppState>>,
    Path(sucursal_id): Path<i32>,
) -> Result<Json<Vec<MovimientoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_movimientos(conn, MovimientoFilter::Sucursal(sucursal_id))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_movimientos_by_producto(
    State(state): State<Arc<AppState>>,
    Path(producto_id): Path<i32>,
) -> Result<Json<Vec<MovimientoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_movimientos(conn, MovimientoFilter::Producto(producto_id))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_movimientos_by_fecha(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FechaQuery>,
) -> Result<Json<Vec<MovimientoDetalle>>, ApiError> {
    let (desde, hasta) =
        parse_date_range(query.fecha_inicio.as_deref(), query.fecha_fin.as_deref())?;
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_movimientos(conn, MovimientoFilter::Rango(desde, hasta))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_movimiento(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<MovimientoDetalle>, ApiError> {
    let item = with_conn(&state.conn, move |conn| first_movimiento(conn, id)).await?;
    Ok(Json(item))
}

pub async fn create_movimiento(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewMovimiento>,
) -> Result<(StatusCode, Json<MovimientoDetalle>), ApiError> {
    if new.cantidad <= 0 {
        return Err(ApiError::validation("La cantidad debe ser mayor que cero"));
    }
    let item = with_conn(&state.conn, move |conn| {
        let created = conn.transaction(|conn| register_movimiento(conn, &new))?;
        log::info!(
            "Movimiento {} registrado: producto={} sucursal={} cantidad={}",
            created.id_movimiento,
            created.id_producto,
            created.id_sucursal,
            created.cantidad
        );
        first_movimiento(conn, created.id_movimiento)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub fn configure_movements_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/movimientos-inventario",
            get(list_movimientos).post(create_movimiento),
        )
        .route("/api/movimientos-inventario/fecha", get(list_movimientos_by_fecha))
        .route(
            "/api/movimientos-inventario/sucursal/:sucursal_id",
            get(list_movimientos_by_sucursal),
        )
        .route(
            "/api/movimientos-inventario/producto/:producto_id",
            get(list_movimientos_by_producto),
        )
        .route("/api/movimientos-inventario/:id", get(get_movimiento))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::test_state;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn send(req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let app = configure_movements_routes().with_state(test_state());
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_fecha_requires_both_bounds() {
        let (status, body) = send(
            Request::get("/api/movimientos-inventario/fecha?fechaInicio=2024-01-01")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Se requieren los parámetros fechaInicio y fechaFin"
        );
    }

    #[tokio::test]
    async fn test_create_rejects_non_positive_cantidad() {
        let (status, body) = send(
            Request::post("/api/movimientos-inventario")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"id_producto":1,"id_sucursal":1,"id_tipo_movimiento":1,"cantidad":0}"#,
                ))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "La cantidad debe ser mayor que cero");
    }

    #[test]
    fn test_new_movimiento_stamps_fecha() {
        let before = Utc::now();
        let new: NewMovimiento = serde_json::from_value(serde_json::json!({
            "id_producto": 3,
            "id_sucursal": 1,
            "id_tipo_movimiento": 1,
            "cantidad": 12,
            "referencia": "OC-118"
        }))
        .unwrap();
        assert!(new.fecha >= before);
        assert_eq!(new.referencia.as_deref(), Some("OC-118"));
        assert_eq!(new.observaciones, None);
    }
}
