//! Stock transfers between branches. A transfer is created `pendiente` and
//! only moves stock when it is completed.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::branches::Sucursal;
use crate::core::shared::schema::{detalle_traspaso, inventario, productos, sucursales, traspasos};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::shared::ApiError;
use crate::inventory::stock::{deposit, withdraw};
use crate::inventory::{lock_inventario, require_inventario, save_stock, NewInventario};
use crate::products::Producto;

const TRASPASO_NOT_FOUND: &str = "Traspaso no encontrado";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstadoTraspaso {
    Pendiente,
    Completado,
    Cancelado,
}

impl EstadoTraspaso {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::Completado => "completado",
            Self::Cancelado => "cancelado",
        }
    }

    /// Only pending transfers can move to another state.
    pub fn transition(self, to: EstadoTraspaso) -> Result<EstadoTraspaso, ApiError> {
        match (self, to) {
            (Self::Pendiente, Self::Completado | Self::Cancelado) => Ok(to),
            _ => Err(ApiError::bad_request(format!(
                "No se puede cambiar un traspaso {self} a {to}"
            ))),
        }
    }
}

impl fmt::Display for EstadoTraspaso {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstadoTraspaso {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pendiente" => Ok(Self::Pendiente),
            "completado" => Ok(Self::Completado),
            "cancelado" => Ok(Self::Cancelado),
            other => Err(ApiError::Internal(format!(
                "Estado de traspaso desconocido: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = traspasos, primary_key(id_traspaso))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Traspaso {
    pub id_traspaso: i32,
    pub fecha: DateTime<Utc>,
    pub id_sucursal_origen: i32,
    pub id_sucursal_destino: i32,
    pub observaciones: Option<String>,
    pub estado: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = traspasos)]
pub struct NewTraspaso {
    pub fecha: DateTime<Utc>,
    pub id_sucursal_origen: i32,
    pub id_sucursal_destino: i32,
    pub observaciones: Option<String>,
    pub estado: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = detalle_traspaso, primary_key(id_detalle))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DetalleTraspaso {
    pub id_detalle: i32,
    pub id_traspaso: i32,
    pub id_producto: i32,
    pub cantidad: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = detalle_traspaso)]
pub struct NewDetalleTraspaso {
    pub id_traspaso: i32,
    pub id_producto: i32,
    pub cantidad: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetalleTraspasoConProducto {
    #[serde(flatten)]
    pub detalle: DetalleTraspaso,
    pub producto: Producto,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraspasoDetalle {
    #[serde(flatten)]
    pub traspaso: Traspaso,
    #[serde(rename = "sucursalOrigen")]
    pub sucursal_origen: Option<Sucursal>,
    #[serde(rename = "sucursalDestino")]
    pub sucursal_destino: Option<Sucursal>,
    pub detalles: Vec<DetalleTraspasoConProducto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineaTraspasoRequest {
    pub id_producto: i32,
    pub cantidad: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTraspasoRequest {
    pub id_sucursal_origen: i32,
    pub id_sucursal_destino: i32,
    pub observaciones: Option<String>,
    #[serde(default)]
    pub detalles: Vec<LineaTraspasoRequest>,
}

impl CreateTraspasoRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.id_sucursal_origen == self.id_sucursal_destino {
            return Err(ApiError::validation(
                "La sucursal de origen y la de destino deben ser distintas",
            ));
        }
        if self.detalles.is_empty() {
            return Err(ApiError::validation(
                "El traspaso debe incluir al menos un producto",
            ));
        }
        if let Some(linea) = self.detalles.iter().find(|l| l.cantidad <= 0) {
            return Err(ApiError::validation(format!(
                "La cantidad del producto {} debe ser mayor que cero",
                linea.id_producto
            )));
        }
        Ok(())
    }
}

pub fn load_traspasos(
    conn: &mut PgConnection,
    id: Option<i32>,
) -> QueryResult<Vec<TraspasoDetalle>> {
    let mut query = traspasos::table
        .select(Traspaso::as_select())
        .into_boxed();
    if let Some(id) = id {
        query = query.filter(traspasos::id_traspaso.eq(id));
    }
    let rows: Vec<Traspaso> = query
        .order((traspasos::fecha.desc(), traspasos::id_traspaso.desc()))
        .load(conn)?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut branch_ids: Vec<i32> = rows
        .iter()
        .flat_map(|t| [t.id_sucursal_origen, t.id_sucursal_destino])
        .collect();
    branch_ids.sort_unstable();
    branch_ids.dedup();
    let branches: HashMap<i32, Sucursal> = sucursales::table
        .filter(sucursales::id_sucursal.eq_any(&branch_ids))
        .select(Sucursal::as_select())
        .load(conn)?
        .into_iter()
        .map(|s| (s.id_sucursal, s))
        .collect();

    let ids: Vec<i32> = rows.iter().map(|t| t.id_traspaso).collect();
    let mut detalles: HashMap<i32, Vec<DetalleTraspasoConProducto>> = HashMap::new();
    let lines: Vec<(DetalleTraspaso, Producto)> = detalle_traspaso::table
        .inner_join(productos::table)
        .filter(detalle_traspaso::id_traspaso.eq_any(&ids))
        .order(detalle_traspaso::id_detalle.asc())
        .select((DetalleTraspaso::as_select(), Producto::as_select()))
        .load(conn)?;
    for (detalle, producto) in lines {
        detalles
            .entry(detalle.id_traspaso)
            .or_default()
            .push(DetalleTraspasoConProducto { detalle, producto });
    }

    Ok(rows
        .into_iter()
        .map(|traspaso| TraspasoDetalle {
            sucursal_origen: branches.get(&traspaso.id_sucursal_origen).cloned(),
            sucursal_destino: branches.get(&traspaso.id_sucursal_destino).cloned(),
            detalles: detalles.remove(&traspaso.id_traspaso).unwrap_or_default(),
            traspaso,
        })
        .collect())
}

fn first_traspaso(conn: &mut PgConnection, id: i32) -> Result<TraspasoDetalle, ApiError> {
    load_traspasos(conn, Some(id))?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(TRASPASO_NOT_FOUND))
}

fn lock_traspaso(conn: &mut PgConnection, id: i32) -> Result<Traspaso, ApiError> {
    traspasos::table
        .find(id)
        .select(Traspaso::as_select())
        .for_update()
        .load(conn)?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(TRASPASO_NOT_FOUND))
}

fn set_estado(conn: &mut PgConnection, id: i32, estado: EstadoTraspaso) -> QueryResult<usize> {
    diesel::update(traspasos::table.find(id))
        .set(traspasos::estado.eq(estado.as_str()))
        .execute(conn)
}

/// Moves every line from the origin branch to the destination branch,
/// creating destination rows that do not exist yet.
fn move_stock(conn: &mut PgConnection, traspaso: &Traspaso) -> Result<(), ApiError> {
    let lines: Vec<DetalleTraspaso> = detalle_traspaso::table
        .filter(detalle_traspaso::id_traspaso.eq(traspaso.id_traspaso))
        .select(DetalleTraspaso::as_select())
        .load(conn)?;

    for line in &lines {
        let origen = require_inventario(conn, line.id_producto, traspaso.id_sucursal_origen)?;
        let restante = withdraw(&origen.stock, line.cantidad, line.id_producto)?;
        save_stock(conn, origen.id_inventario, &restante)?;

        match lock_inventario(conn, line.id_producto, traspaso.id_sucursal_destino)? {
            Some(destino) => {
                let total = deposit(&destino.stock, line.cantidad)?;
                save_stock(conn, destino.id_inventario, &total)?;
            }
            None => {
                diesel::insert_into(inventario::table)
                    .values(&NewInventario {
                        id_producto: line.id_producto,
                        id_sucursal: traspaso.id_sucursal_destino,
                        stock: deposit(&BigDecimal::zero(), line.cantidad)?,
                    })
                    .execute(conn)?;
            }
        }
    }
    Ok(())
}

pub async fn list_traspasos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TraspasoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, |conn| Ok(load_traspasos(conn, None)?)).await?;
    Ok(Json(items))
}

pub async fn get_traspaso(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<TraspasoDetalle>, ApiError> {
    let item = with_conn(&state.conn, move |conn| first_traspaso(conn, id)).await?;
    Ok(Json(item))
}

pub async fn create_traspaso(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTraspasoRequest>,
) -> Result<(StatusCode, Json<TraspasoDetalle>), ApiError> {
    req.validate()?;
    let item = with_conn(&state.conn, move |conn| {
        let id = conn.transaction(|conn| {
            let id: i32 = diesel::insert_into(traspasos::table)
                .values(&NewTraspaso {
                    fecha: Utc::now(),
                    id_sucursal_origen: req.id_sucursal_origen,
                    id_sucursal_destino: req.id_sucursal_destino,
                    observaciones: req.observaciones.clone(),
                    estado: EstadoTraspaso::Pendiente.as_str().to_string(),
                })
                .returning(traspasos::id_traspaso)
                .get_result(conn)?;
            let lines: Vec<NewDetalleTraspaso> = req
                .detalles
                .iter()
                .map(|l| NewDetalleTraspaso {
                    id_traspaso: id,
                    id_producto: l.id_producto,
                    cantidad: l.cantidad,
                })
                .collect();
            diesel::insert_into(detalle_traspaso::table)
                .values(&lines)
                .execute(conn)?;
            Ok::<_, ApiError>(id)
        })?;
        first_traspaso(conn, id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn completar_traspaso(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<TraspasoDetalle>, ApiError> {
    let item = with_conn(&state.conn, move |conn| {
        conn.transaction(|conn| {
            let traspaso = lock_traspaso(conn, id)?;
            let estado = traspaso
                .estado
                .parse::<EstadoTraspaso>()?
                .transition(EstadoTraspaso::Completado)?;
            move_stock(conn, &traspaso)?;
            set_estado(conn, id, estado)?;
            Ok::<_, ApiError>(())
        })?;
        log::info!("Traspaso {id} completado");
        first_traspaso(conn, id)
    })
    .await?;
    Ok(Json(item))
}

pub async fn cancelar_traspaso(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<TraspasoDetalle>, ApiError> {
    let item = with_conn(&state.conn, move |conn| {
        conn.transaction(|conn| {
            let traspaso = lock_traspaso(conn, id)?;
            let estado = traspaso
                .estado
                .parse::<EstadoTraspaso>()?
                .transition(EstadoTraspaso::Cancelado)?;
            set_estado(conn, id, estado)?;
            Ok::<_, ApiError>(())
        })?;
        log::info!("Traspaso {id} cancelado");
        first_traspaso(conn, id)
    })
    .await?;
    Ok(Json(item))
}

pub fn configure_transfers_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/traspasos", get(list_traspasos).post(create_traspaso))
        .route("/api/traspasos/:id", get(get_traspaso))
        .route("/api/traspasos/:id/completar", put(completar_traspaso))
        .route("/api/traspasos/:id/cancelar", put(cancelar_traspaso))
}
