//! Counter sales. A sale is written in one transaction together with its
//! lines, the stock withdrawals for each line and, for credit customers, the
//! credit it opens.

pub mod api;
pub mod payment_types;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::branches::Sucursal;
use crate::core::shared::schema::{clientes, detalle_ventas, productos, sucursales, tipos_pago, ventas};
use crate::core::shared::utils::{check_numeric, money};
use crate::core::shared::ApiError;
use crate::customers::Cliente;
use crate::inventory::stock::{line_subtotal, sale_total};
use crate::products::Producto;
use payment_types::TipoPago;

pub use api::configure_sales_routes;
pub use payment_types::configure_payment_types_routes;

pub const DEFAULT_DIAS_CREDITO: i64 = 30;
pub const MAX_DIAS_CREDITO: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = ventas, primary_key(id_venta))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Venta {
    pub id_venta: i32,
    pub id_cliente: i32,
    pub id_sucursal: i32,
    pub fecha: DateTime<Utc>,
    pub total: BigDecimal,
    pub id_tipo_pago: i32,
    pub observaciones: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ventas)]
pub struct NewVenta {
    pub id_cliente: i32,
    pub id_sucursal: i32,
    pub fecha: DateTime<Utc>,
    pub total: BigDecimal,
    pub id_tipo_pago: i32,
    pub observaciones: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = detalle_ventas, primary_key(id_detalle))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DetalleVenta {
    pub id_detalle: i32,
    pub id_venta: i32,
    pub id_producto: i32,
    pub cantidad: i32,
    pub precio_unitario: BigDecimal,
    pub subtotal: BigDecimal,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = detalle_ventas)]
pub struct NewDetalleVenta {
    pub id_venta: i32,
    pub id_producto: i32,
    pub cantidad: i32,
    pub precio_unitario: BigDecimal,
    pub subtotal: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetalleVentaConProducto {
    #[serde(flatten)]
    pub detalle: DetalleVenta,
    pub producto: Producto,
}

#[derive(Debug, Clone, Serialize)]
pub struct VentaDetalle {
    #[serde(flatten)]
    pub venta: Venta,
    pub cliente: Cliente,
    pub sucursal: Sucursal,
    #[serde(rename = "tipoPago")]
    pub tipo_pago: TipoPago,
    pub detalles: Vec<DetalleVentaConProducto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineaVentaRequest {
    pub id_producto: i32,
    pub cantidad: i32,
    pub precio_unitario: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVentaRequest {
    pub id_cliente: i32,
    pub id_sucursal: i32,
    pub id_tipo_pago: i32,
    pub observaciones: Option<String>,
    #[serde(default)]
    pub detalles: Vec<LineaVentaRequest>,
    #[serde(default)]
    pub a_credito: bool,
    pub dias_credito: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineaVenta {
    pub id_producto: i32,
    pub cantidad: i32,
    pub precio_unitario: BigDecimal,
    pub subtotal: BigDecimal,
}

/// A validated sale, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct SalePlan {
    pub id_cliente: i32,
    pub id_sucursal: i32,
    pub id_tipo_pago: i32,
    pub observaciones: Option<String>,
    pub lineas: Vec<LineaVenta>,
    pub total: BigDecimal,
    pub dias_credito: Option<i64>,
}

impl CreateVentaRequest {
    pub fn plan(self) -> Result<SalePlan, ApiError> {
        if self.detalles.is_empty() {
            return Err(ApiError::validation(
                "La venta debe incluir al menos un producto",
            ));
        }

        let mut lineas = Vec::with_capacity(self.detalles.len());
        for linea in self.detalles {
            if linea.cantidad <= 0 {
                return Err(ApiError::validation(format!(
                    "La cantidad del producto {} debe ser mayor que cero",
                    linea.id_producto
                )));
            }
            let precio_unitario = money(linea.precio_unitario, "precio_unitario")?;
            let subtotal = line_subtotal(linea.cantidad, &precio_unitario);
            check_numeric(&subtotal, "subtotal")?;
            lineas.push(LineaVenta {
                id_producto: linea.id_producto,
                cantidad: linea.cantidad,
                subtotal,
                precio_unitario,
            });
        }

        let total = sale_total(lineas.iter().map(|l| (l.cantidad, &l.precio_unitario)));
        check_numeric(&total, "total")?;

        let dias_credito = if self.a_credito {
            let dias = self.dias_credito.unwrap_or(DEFAULT_DIAS_CREDITO);
            if dias <= 0 {
                return Err(ApiError::validation(
                    "dias_credito debe ser mayor que cero",
                ));
            }
            if dias > MAX_DIAS_CREDITO {
                return Err(ApiError::validation(format!(
                    "dias_credito no puede exceder {MAX_DIAS_CREDITO}"
                )));
            }
            Some(dias)
        } else {
            None
        };

        Ok(SalePlan {
            id_cliente: self.id_cliente,
            id_sucursal: self.id_sucursal,
            id_tipo_pago: self.id_tipo_pago,
            observaciones: self.observaciones,
            lineas,
            total,
            dias_credito,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VentaFilter {
    Todas,
    Cliente(i32),
    Sucursal(i32),
    Id(i32),
    Rango(DateTime<Utc>, DateTime<Utc>),
}

pub fn load_ventas(conn: &mut PgConnection, filter: VentaFilter) -> QueryResult<Vec<VentaDetalle>> {
    let mut query = ventas::table
        .inner_join(clientes::table)
        .inner_join(sucursales::table)
        .inner_join(tipos_pago::table)
        .select((
            Venta::as_select(),
            Cliente::as_select(),
            Sucursal::as_select(),
            TipoPago::as_select(),
        ))
        .into_boxed();

    query = match filter {
        VentaFilter::Todas => query,
        VentaFilter::Cliente(id) => query.filter(ventas::id_cliente.eq(id)),
        VentaFilter::Sucursal(id) => query.filter(ventas::id_sucursal.eq(id)),
        VentaFilter::Id(id) => query.filter(ventas::id_venta.eq(id)),
        VentaFilter::Rango(desde, hasta) => query
            .filter(ventas::fecha.ge(desde))
            .filter(ventas::fecha.le(hasta)),
    };

    let rows: Vec<(Venta, Cliente, Sucursal, TipoPago)> = query
        .order((ventas::fecha.desc(), ventas::id_venta.desc()))
        .load(conn)?;

    let ids: Vec<i32> = rows.iter().map(|(v, _, _, _)| v.id_venta).collect();
    let mut detalles = load_detalles(conn, &ids)?;

    Ok(rows
        .into_iter()
        .map(|(venta, cliente, sucursal, tipo_pago)| VentaDetalle {
            detalles: detalles.remove(&venta.id_venta).unwrap_or_default(),
            venta,
            cliente,
            sucursal,
            tipo_pago,
        })
        .collect())
}

fn load_detalles(
    conn: &mut PgConnection,
    venta_ids: &[i32],
) -> QueryResult<HashMap<i32, Vec<DetalleVentaConProducto>>> {
    if venta_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(DetalleVenta, Producto)> = detalle_ventas::table
        .inner_join(productos::table)
        .filter(detalle_ventas::id_venta.eq_any(venta_ids))
        .order(detalle_ventas::id_detalle.asc())
        .select((DetalleVenta::as_select(), Producto::as_select()))
        .load(conn)?;

    let mut grouped: HashMap<i32, Vec<DetalleVentaConProducto>> = HashMap::new();
    for (detalle, producto) in rows {
        grouped
            .entry(detalle.id_venta)
            .or_default()
            .push(DetalleVentaConProducto { detalle, producto });
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn request(detalles: serde_json::Value) -> CreateVentaRequest {
        serde_json::from_value(serde_json::json!({
            "id_cliente": 1,
            "id_sucursal": 2,
            "id_tipo_pago": 1,
            "detalles": detalles
        }))
        .unwrap()
    }

    #[test]
    fn test_plan_computes_subtotals_and_total() {
        let plan = request(serde_json::json!([
            { "id_producto": 10, "cantidad": 2, "precio_unitario": 1850.0 },
            { "id_producto": 11, "cantidad": 3, "precio_unitario": 99.99 }
        ]))
        .plan()
        .unwrap();
        assert_eq!(plan.lineas.len(), 2);
        assert_eq!(plan.lineas[0].subtotal, BigDecimal::from_str("3700.00").unwrap());
        assert_eq!(plan.lineas[1].subtotal, BigDecimal::from_str("299.97").unwrap());
        assert_eq!(plan.total, BigDecimal::from_str("3999.97").unwrap());
        assert_eq!(plan.dias_credito, None);
    }

    #[test]
    fn test_plan_rejects_empty_and_bad_lines() {
        assert!(request(serde_json::json!([])).plan().is_err());
        assert!(request(serde_json::json!([
            { "id_producto": 10, "cantidad": 0, "precio_unitario": 10.0 }
        ]))
        .plan()
        .is_err());
        assert!(request(serde_json::json!([
            { "id_producto": 10, "cantidad": 1, "precio_unitario": -10.0 }
        ]))
        .plan()
        .is_err());
    }

    #[test]
    fn test_plan_credit_defaults_to_thirty_days() {
        let mut req = request(serde_json::json!([
            { "id_producto": 10, "cantidad": 1, "precio_unitario": 500.0 }
        ]));
        req.a_credito = true;
        assert_eq!(req.clone().plan().unwrap().dias_credito, Some(30));
        req.dias_credito = Some(0);
        assert!(req.clone().plan().is_err());
    }

    #[test]
    fn test_plan_bounds_credit_term() {
        let mut req = request(serde_json::json!([
            { "id_producto": 10, "cantidad": 1, "precio_unitario": 500.0 }
        ]));
        req.a_credito = true;
        req.dias_credito = Some(MAX_DIAS_CREDITO);
        assert_eq!(req.clone().plan().unwrap().dias_credito, Some(MAX_DIAS_CREDITO));
        req.dias_credito = Some(100_000_000);
        assert!(matches!(req.clone().plan(), Err(ApiError::Validation(_))));
        req.dias_credito = Some(i64::MAX);
        assert!(matches!(req.plan(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_plan_rejects_totals_beyond_column_range() {
        let line = request(serde_json::json!([
            { "id_producto": 10, "cantidad": 1000, "precio_unitario": 99_999_999.0 }
        ]));
        assert!(matches!(line.plan(), Err(ApiError::Validation(_))));

        let total = request(serde_json::json!([
            { "id_producto": 10, "cantidad": 1, "precio_unitario": 60_000_000.0 },
            { "id_producto": 11, "cantidad": 1, "precio_unitario": 60_000_000.0 }
        ]));
        assert!(matches!(total.plan(), Err(ApiError::Validation(_))));
    }
}
