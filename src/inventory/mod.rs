//! Per-branch stock (`inventario`), inventory movements and the movement
//! type catalog. Every write that changes a stock figure goes through
//! [`lock_inventario`] inside a transaction and computes the new value with
//! the pure functions in [`stock`].

pub mod api;
pub mod movement_types;
pub mod movements;
pub mod stock;

use bigdecimal::BigDecimal;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::branches::Sucursal;
use crate::core::shared::schema::{inventario, productos, sucursales};
use crate::core::shared::ApiError;
use crate::products::Producto;

pub use api::configure_inventory_routes;
pub use movement_types::configure_movement_types_routes;
pub use movements::configure_movements_routes;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = inventario, primary_key(id_inventario))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Inventario {
    pub id_inventario: i32,
    pub id_producto: i32,
    pub id_sucursal: i32,
    pub stock: BigDecimal,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = inventario)]
pub struct NewInventario {
    pub id_producto: i32,
    pub id_sucursal: i32,
    pub stock: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventarioDetalle {
    #[serde(flatten)]
    pub inventario: Inventario,
    pub producto: Producto,
    pub sucursal: Sucursal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventarioFilter {
    Todos,
    Sucursal(i32),
    Producto(i32),
    Id(i32),
}

pub fn load_inventario(
    conn: &mut PgConnection,
    filter: InventarioFilter,
) -> QueryResult<Vec<InventarioDetalle>> {
    let mut query = inventario::table
        .inner_join(productos::table)
        .inner_join(sucursales::table)
        .select((
            Inventario::as_select(),
            Producto::as_select(),
            Sucursal::as_select(),
        ))
        .into_boxed();

    query = match filter {
        InventarioFilter::Todos => query,
        InventarioFilter::Sucursal(id) => query.filter(inventario::id_sucursal.eq(id)),
        InventarioFilter::Producto(id) => query.filter(inventario::id_producto.eq(id)),
        InventarioFilter::Id(id) => query.filter(inventario::id_inventario.eq(id)),
    };

    let rows: Vec<(Inventario, Producto, Sucursal)> =
        query.order(inventario::id_inventario.asc()).load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(inventario, producto, sucursal)| InventarioDetalle {
            inventario,
            producto,
            sucursal,
        })
        .collect())
}

/// Fetches the (product, branch) row with `FOR UPDATE`. Must run inside a
/// transaction for the lock to hold until the write.
pub fn lock_inventario(
    conn: &mut PgConnection,
    id_producto: i32,
    id_sucursal: i32,
) -> QueryResult<Option<Inventario>> {
    inventario::table
        .filter(inventario::id_producto.eq(id_producto))
        .filter(inventario::id_sucursal.eq(id_sucursal))
        .select(Inventario::as_select())
        .for_update()
        .load(conn)
        .map(|rows| rows.into_iter().next())
}

/// Same as [`lock_inventario`] but a missing row is a client error.
pub fn require_inventario(
    conn: &mut PgConnection,
    id_producto: i32,
    id_sucursal: i32,
) -> Result<Inventario, ApiError> {
    lock_inventario(conn, id_producto, id_sucursal)?.ok_or_else(|| {
        ApiError::bad_request(missing_inventario_message(id_producto, id_sucursal))
    })
}

pub fn missing_inventario_message(id_producto: i32, id_sucursal: i32) -> String {
    format!("No hay inventario para el producto {id_producto} en la sucursal {id_sucursal}")
}

pub fn save_stock(
    conn: &mut PgConnection,
    id_inventario: i32,
    stock: &BigDecimal,
) -> QueryResult<Inventario> {
    diesel::update(inventario::table.find(id_inventario))
        .set(inventario::stock.eq(stock))
        .returning(Inventario::as_returning())
        .get_result(conn)
}
