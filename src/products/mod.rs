//! Product catalog: categories, units of measure and products.
//!
//! Products are always returned with their category, unit and the stock
//! summed over every branch (`stock_total`).

pub mod api;

use bigdecimal::{BigDecimal, Zero};
use diesel::dsl::sum;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::shared::schema::{categorias, inventario, productos, unidades_medida};
use crate::inventory::stock::is_low;

pub use api::configure_catalog_routes;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = categorias, primary_key(id_categoria))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Categoria {
    pub id_categoria: i32,
    pub nombre_categoria: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = categorias)]
pub struct NewCategoria {
    pub nombre_categoria: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = unidades_medida, primary_key(id_unidad))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UnidadMedida {
    pub id_unidad: i32,
    pub unidad: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = unidades_medida)]
pub struct NewUnidadMedida {
    pub unidad: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = productos, primary_key(id_producto))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Producto {
    pub id_producto: i32,
    pub nombre: String,
    pub descripcion: String,
    pub sku: Option<String>,
    pub precio_venta: BigDecimal,
    pub costo: BigDecimal,
    pub id_unidad: i32,
    pub id_categoria: i32,
    pub activo: bool,
    pub stock_minimo: BigDecimal,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = productos)]
pub struct NewProducto {
    pub nombre: String,
    pub descripcion: String,
    pub sku: Option<String>,
    pub precio_venta: BigDecimal,
    pub costo: BigDecimal,
    pub id_unidad: i32,
    pub id_categoria: i32,
    pub activo: bool,
    pub stock_minimo: BigDecimal,
}

#[derive(Debug, Default, PartialEq, AsChangeset)]
#[diesel(table_name = productos)]
pub struct ProductoChanges {
    pub nombre: Option<String>,
    pub descripcion: Option<String>,
    /// `Some(None)` clears the column.
    pub sku: Option<Option<String>>,
    pub precio_venta: Option<BigDecimal>,
    pub costo: Option<BigDecimal>,
    pub id_unidad: Option<i32>,
    pub id_categoria: Option<i32>,
    pub activo: Option<bool>,
    pub stock_minimo: Option<BigDecimal>,
}

impl ProductoChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductoDetalle {
    #[serde(flatten)]
    pub producto: Producto,
    pub categoria: Categoria,
    #[serde(rename = "unidadMedida")]
    pub unidad_medida: UnidadMedida,
    pub stock_total: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductoFilter {
    Todos,
    Activos,
    Categoria(i32),
    Id(i32),
}

/// Loads products with their relations and per-branch stock total.
pub fn load_productos(
    conn: &mut PgConnection,
    filter: ProductoFilter,
) -> QueryResult<Vec<ProductoDetalle>> {
    let mut query = productos::table
        .inner_join(categorias::table)
        .inner_join(unidades_medida::table)
        .select((
            Producto::as_select(),
            Categoria::as_select(),
            UnidadMedida::as_select(),
        ))
        .into_boxed();

    query = match filter {
        ProductoFilter::Todos => query,
        ProductoFilter::Activos => query.filter(productos::activo.eq(true)),
        ProductoFilter::Categoria(id) => query.filter(productos::id_categoria.eq(id)),
        ProductoFilter::Id(id) => query.filter(productos::id_producto.eq(id)),
    };

    let rows: Vec<(Producto, Categoria, UnidadMedida)> =
        query.order(productos::id_producto.asc()).load(conn)?;

    let ids: Vec<i32> = rows.iter().map(|(p, _, _)| p.id_producto).collect();
    let totals = stock_totals(conn, &ids)?;

    Ok(rows
        .into_iter()
        .map(|(producto, categoria, unidad_medida)| {
            let stock_total = totals
                .get(&producto.id_producto)
                .cloned()
                .unwrap_or_else(BigDecimal::zero);
            ProductoDetalle {
                producto,
                categoria,
                unidad_medida,
                stock_total,
            }
        })
        .collect())
}

pub fn stock_totals(
    conn: &mut PgConnection,
    ids: &[i32],
) -> QueryResult<HashMap<i32, BigDecimal>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i32, Option<BigDecimal>)> = inventario::table
        .filter(inventario::id_producto.eq_any(ids))
        .group_by(inventario::id_producto)
        .select((inventario::id_producto, sum(inventario::stock)))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(id, total)| (id, total.unwrap_or_else(BigDecimal::zero)))
        .collect())
}

/// Active products whose stock across branches is at or below `stock_minimo`.
pub fn low_stock(items: Vec<ProductoDetalle>) -> Vec<ProductoDetalle> {
    items
        .into_iter()
        .filter(|p| p.producto.activo && is_low(&p.stock_total, &p.producto.stock_minimo))
        .collect()
}
