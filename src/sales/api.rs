use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;

use super::{
    load_ventas, CreateVentaRequest, NewDetalleVenta, NewVenta, SalePlan, VentaDetalle,
    VentaFilter,
};
use crate::core::shared::schema::{detalle_ventas, ventas};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{parse_date_range, with_conn};
use crate::core::shared::ApiError;
use crate::credits::open_credito;
use crate::inventory::movements::FechaQuery;
use crate::inventory::stock::withdraw;
use crate::inventory::{require_inventario, save_stock};

const VENTA_NOT_FOUND: &str = "Venta no encontrada";

fn first_venta(conn: &mut PgConnection, id: i32) -> Result<VentaDetalle, ApiError> {
    load_ventas(conn, VentaFilter::Id(id))?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(VENTA_NOT_FOUND))
}

/// Writes a planned sale. Stock is checked and withdrawn line by line before
/// the sale row exists, and any error rolls the whole transaction back.
pub fn record_sale(conn: &mut PgConnection, plan: &SalePlan) -> Result<i32, ApiError> {
    conn.transaction(|conn| {
        for linea in &plan.lineas {
            let row = require_inventario(conn, linea.id_producto, plan.id_sucursal)?;
            let next = withdraw(&row.stock, linea.cantidad, linea.id_producto)?;
            save_stock(conn, row.id_inventario, &next)?;
        }

        let id_venta: i32 = diesel::insert_into(ventas::table)
            .values(&NewVenta {
                id_cliente: plan.id_cliente,
                id_sucursal: plan.id_sucursal,
                fecha: Utc::now(),
                total: plan.total.clone(),
                id_tipo_pago: plan.id_tipo_pago,
                observaciones: plan.observaciones.clone(),
            })
            .returning(ventas::id_venta)
            .get_result(conn)?;

        let detalles: Vec<NewDetalleVenta> = plan
            .lineas
            .iter()
            .map(|linea| NewDetalleVenta {
                id_venta,
                id_producto: linea.id_producto,
                cantidad: linea.cantidad,
                precio_unitario: linea.precio_unitario.clone(),
                subtotal: linea.subtotal.clone(),
            })
            .collect();
        diesel::insert_into(detalle_ventas::table)
            .values(&detalles)
            .execute(conn)?;

        if let Some(dias) = plan.dias_credito {
            open_credito(conn, plan.id_cliente, id_venta, &plan.total, dias)?;
        }

        Ok(id_venta)
    })
}

pub async fn list_ventas(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VentaDetalle>>, ApiError> {
    let items = with_conn(&state.conn, |conn| Ok(load_ventas(conn, VentaFilter::Todas)?)).await?;
    Ok(Json(items))
}

pub async fn list_ventas_by_cliente(
    State(state): State<Arc<AppState>>,
    Path(cliente_id): Path<i32>,
) -> Result<Json<Vec<VentaDetalle>>, ApiError> {
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_ventas(conn, VentaFilter::Cliente(cliente_id))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_ventas_by_sucursal(
    State(state): State<Arc<AppState>>,
    Path(sucursal_id): Path<i32>,
) -> Result<Json<Vec<VentaDetalle>>, ApiError> {
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_ventas(conn, VentaFilter::Sucursal(sucursal_id))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_ventas_by_fecha(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FechaQuery>,
) -> Result<Json<Vec<VentaDetalle>>, ApiError> {
    let (desde, hasta) =
        parse_date_range(query.fecha_inicio.as_deref(), query.fecha_fin.as_deref())?;
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_ventas(conn, VentaFilter::Rango(desde, hasta))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_venta(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<VentaDetalle>, ApiError> {
    let item = with_conn(&state.conn, move |conn| first_venta(conn, id)).await?;
    Ok(Json(item))
}

pub async fn create_venta(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVentaRequest>,
) -> Result<(StatusCode, Json<VentaDetalle>), ApiError> {
    let plan = req.plan()?;
    let item = with_conn(&state.conn, move |conn| {
        let id = record_sale(conn, &plan)?;
        log::info!(
            "Venta {id} registrada: sucursal={} total={} lineas={}",
            plan.id_sucursal,
            plan.total,
            plan.lineas.len()
        );
        first_venta(conn, id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub fn configure_sales_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ventas", get(list_ventas).post(create_venta))
        .route("/api/ventas/fecha", get(list_ventas_by_fecha))
        .route("/api/ventas/cliente/:cliente_id", get(list_ventas_by_cliente))
        .route(
            "/api/ventas/sucursal/:sucursal_id",
            get(list_ventas_by_sucursal),
        )
        .route("/api/ventas/:id", get(get_venta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::test_state;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_create_venta_without_lines_is_rejected() {
        let app = configure_sales_routes().with_state(test_state());
        let response = app
            .oneshot(
                Request::post("/api/ventas")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"id_cliente":1,"id_sucursal":1,"id_tipo_pago":1,"detalles":[]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "La venta debe incluir al menos un producto");
    }

    #[tokio::test]
    async fn test_ventas_por_fecha_rejects_bad_date() {
        let app = configure_sales_routes().with_state(test_state());
        let response = app
            .oneshot(
                Request::get("/api/ventas/fecha?fechaInicio=2024-13-01&fechaFin=2024-12-31")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
