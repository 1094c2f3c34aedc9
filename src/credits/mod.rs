//! Customer credit: the credit a sale on account opens and the payments
//! registered against it. `creditos.saldo_pendiente` and
//! `clientes.saldo_actual` always move together in one transaction.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bigdecimal::{BigDecimal, Signed, Zero};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::shared::schema::{clientes, creditos, pagos_credito};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{money, require_non_empty, with_conn};
use crate::core::shared::ApiError;
use crate::customers::Cliente;

const CREDITO_NOT_FOUND: &str = "Crédito no encontrado";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = creditos, primary_key(id_credito))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Credito {
    pub id_credito: i32,
    pub id_cliente: i32,
    pub id_venta: i32,
    pub monto_total: BigDecimal,
    pub saldo_pendiente: BigDecimal,
    pub fecha_inicio: DateTime<Utc>,
    pub fecha_vencimiento: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = creditos)]
pub struct NewCredito {
    pub id_cliente: i32,
    pub id_venta: i32,
    pub monto_total: BigDecimal,
    pub saldo_pendiente: BigDecimal,
    pub fecha_inicio: DateTime<Utc>,
    pub fecha_vencimiento: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = pagos_credito, primary_key(id_pago))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PagoCredito {
    pub id_pago: i32,
    pub id_credito: i32,
    pub fecha_pago: NaiveDate,
    pub monto_pagado: BigDecimal,
    pub metodo_pago: String,
    pub observaciones: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = pagos_credito)]
pub struct NewPagoCredito {
    pub id_credito: i32,
    pub fecha_pago: NaiveDate,
    pub monto_pagado: BigDecimal,
    pub metodo_pago: String,
    pub observaciones: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditoDetalle {
    #[serde(flatten)]
    pub credito: Credito,
    pub cliente: Cliente,
    pub pagos: Vec<PagoCredito>,
}

#[derive(Debug, Deserialize)]
pub struct PagoRequest {
    pub monto_pagado: f64,
    pub metodo_pago: String,
    pub fecha_pago: Option<NaiveDate>,
    pub observaciones: Option<String>,
}

/// Rejects a charge the customer cannot take on credit.
pub fn check_credit_limit(cliente: &Cliente, monto: &BigDecimal) -> Result<(), ApiError> {
    if !cliente.is_credit_customer() {
        return Err(ApiError::bad_request(format!(
            "El cliente {} no tiene crédito autorizado",
            cliente.id_cliente
        )));
    }
    if !cliente.activo {
        return Err(ApiError::bad_request(format!(
            "El cliente {} está inactivo",
            cliente.id_cliente
        )));
    }
    if monto > &cliente.available_credit() {
        return Err(ApiError::bad_request(
            "La venta excede el límite de crédito del cliente",
        ));
    }
    Ok(())
}

/// Remaining balance after a payment.
pub fn apply_payment(
    saldo_pendiente: &BigDecimal,
    monto: &BigDecimal,
) -> Result<BigDecimal, ApiError> {
    if !monto.is_positive() {
        return Err(ApiError::validation(
            "El monto del pago debe ser mayor que cero",
        ));
    }
    if monto > saldo_pendiente {
        return Err(ApiError::bad_request(
            "El monto del pago excede el saldo pendiente del crédito",
        ));
    }
    Ok(saldo_pendiente - monto)
}

/// Due date of a credit opened at `inicio` with a term of `dias` days.
pub fn vencimiento(inicio: DateTime<Utc>, dias: i64) -> Result<DateTime<Utc>, ApiError> {
    Duration::try_days(dias)
        .and_then(|plazo| inicio.checked_add_signed(plazo))
        .ok_or_else(|| ApiError::validation(format!("dias_credito fuera de rango: {dias}")))
}

pub fn lock_cliente(conn: &mut PgConnection, id: i32) -> Result<Cliente, ApiError> {
    clientes::table
        .find(id)
        .select(Cliente::as_select())
        .for_update()
        .load(conn)?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request(format!("Cliente con ID {id} no encontrado")))
}

/// Opens a credit for a sale and charges it to the customer's balance.
/// Runs inside the sale transaction.
pub fn open_credito(
    conn: &mut PgConnection,
    id_cliente: i32,
    id_venta: i32,
    monto: &BigDecimal,
    dias_credito: i64,
) -> Result<Credito, ApiError> {
    let cliente = lock_cliente(conn, id_cliente)?;
    check_credit_limit(&cliente, monto)?;

    diesel::update(clientes::table.find(id_cliente))
        .set(clientes::saldo_actual.eq(&cliente.saldo_actual + monto))
        .execute(conn)?;

    let fecha_inicio = Utc::now();
    let fecha_vencimiento = vencimiento(fecha_inicio, dias_credito)?;
    let credito = diesel::insert_into(creditos::table)
        .values(&NewCredito {
            id_cliente,
            id_venta,
            monto_total: monto.clone(),
            saldo_pendiente: monto.clone(),
            fecha_inicio,
            fecha_vencimiento,
        })
        .returning(Credito::as_returning())
        .get_result(conn)?;

    log::info!(
        "Crédito {} abierto para cliente {id_cliente} por {monto}",
        credito.id_credito
    );
    Ok(credito)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditoFilter {
    Todos,
    Cliente(i32),
    Id(i32),
}

pub fn load_creditos(
    conn: &mut PgConnection,
    filter: CreditoFilter,
) -> QueryResult<Vec<CreditoDetalle>> {
    let mut query = creditos::table
        .inner_join(clientes::table)
        .select((Credito::as_select(), Cliente::as_select()))
        .into_boxed();

    query = match filter {
        CreditoFilter::Todos => query,
        CreditoFilter::Cliente(id) => query.filter(creditos::id_cliente.eq(id)),
        CreditoFilter::Id(id) => query.filter(creditos::id_credito.eq(id)),
    };

    let rows: Vec<(Credito, Cliente)> = query.order(creditos::id_credito.asc()).load(conn)?;

    let ids: Vec<i32> = rows.iter().map(|(c, _)| c.id_credito).collect();
    let mut pagos: HashMap<i32, Vec<PagoCredito>> = HashMap::new();
    if !ids.is_empty() {
        let rows: Vec<PagoCredito> = pagos_credito::table
            .filter(pagos_credito::id_credito.eq_any(&ids))
            .order(pagos_credito::id_pago.asc())
            .select(PagoCredito::as_select())
            .load(conn)?;
        for pago in rows {
            pagos.entry(pago.id_credito).or_default().push(pago);
        }
    }

    Ok(rows
        .into_iter()
        .map(|(credito, cliente)| CreditoDetalle {
            pagos: pagos.remove(&credito.id_credito).unwrap_or_default(),
            credito,
            cliente,
        })
        .collect())
}

fn first_credito(conn: &mut PgConnection, id: i32) -> Result<CreditoDetalle, ApiError> {
    load_creditos(conn, CreditoFilter::Id(id))?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(CREDITO_NOT_FOUND))
}

pub async fn list_creditos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CreditoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, |conn| {
        Ok(load_creditos(conn, CreditoFilter::Todos)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn list_creditos_by_cliente(
    State(state): State<Arc<AppState>>,
    Path(cliente_id): Path<i32>,
) -> Result<Json<Vec<CreditoDetalle>>, ApiError> {
    let items = with_conn(&state.conn, move |conn| {
        Ok(load_creditos(conn, CreditoFilter::Cliente(cliente_id))?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_credito(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<CreditoDetalle>, ApiError> {
    let item = with_conn(&state.conn, move |conn| first_credito(conn, id)).await?;
    Ok(Json(item))
}

pub async fn register_pago(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<PagoRequest>,
) -> Result<(StatusCode, Json<CreditoDetalle>), ApiError> {
    require_non_empty(&req.metodo_pago, "metodo_pago")?;
    let monto = money(req.monto_pagado, "monto_pagado")?;
    if monto.is_zero() {
        return Err(ApiError::validation(
            "El monto del pago debe ser mayor que cero",
        ));
    }

    let item = with_conn(&state.conn, move |conn| {
        conn.transaction(|conn| {
            let credito: Credito = creditos::table
                .find(id)
                .select(Credito::as_select())
                .for_update()
                .load(conn)?
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::not_found(CREDITO_NOT_FOUND))?;

            let saldo = apply_payment(&credito.saldo_pendiente, &monto)?;
            let cliente = lock_cliente(conn, credito.id_cliente)?;
            let saldo_cliente = (&cliente.saldo_actual - &monto).max(BigDecimal::zero());

            diesel::update(creditos::table.find(id))
                .set(creditos::saldo_pendiente.eq(&saldo))
                .execute(conn)?;
            diesel::update(clientes::table.find(cliente.id_cliente))
                .set(clientes::saldo_actual.eq(&saldo_cliente))
                .execute(conn)?;
            diesel::insert_into(pagos_credito::table)
                .values(&NewPagoCredito {
                    id_credito: id,
                    fecha_pago: req.fecha_pago.unwrap_or_else(|| Utc::now().date_naive()),
                    monto_pagado: monto.clone(),
                    metodo_pago: req.metodo_pago.trim().to_string(),
                    observaciones: req.observaciones,
                })
                .execute(conn)?;

            log::info!("Pago de {monto} aplicado al crédito {id}, saldo {saldo}");
            Ok::<_, ApiError>(())
        })?;
        first_credito(conn, id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub fn configure_credits_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/creditos", get(list_creditos))
        .route(
            "/api/creditos/cliente/:cliente_id",
            get(list_creditos_by_cliente),
        )
        .route("/api/creditos/:id", get(get_credito))
        .route("/api/creditos/:id/pagos", post(register_pago))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customers::{TIPO_CREDITO, TIPO_NORMAL};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_vencimiento_rejects_unrepresentable_terms() {
        let inicio = Utc::now();
        assert_eq!(vencimiento(inicio, 30).unwrap(), inicio + Duration::days(30));
        assert!(matches!(
            vencimiento(inicio, 100_000_000),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(vencimiento(inicio, i64::MAX), Err(ApiError::Validation(_))));
    }

    fn cliente(tipo: &str, limite: &str, saldo: &str) -> Cliente {
        Cliente {
            id_cliente: 5,
            nombre: "Transportes del Bajío".into(),
            direccion: String::new(),
            telefono: String::new(),
            email: String::new(),
            rfc: String::new(),
            tipo_cliente: tipo.into(),
            limite_credito: dec(limite),
            saldo_actual: dec(saldo),
            activo: true,
        }
    }

    #[test]
    fn test_credit_limit_checks() {
        let c = cliente(TIPO_CREDITO, "10000", "8000");
        assert!(check_credit_limit(&c, &dec("2000")).is_ok());
        assert!(check_credit_limit(&c, &dec("2000.01")).is_err());
        assert!(check_credit_limit(&cliente(TIPO_NORMAL, "10000", "0"), &dec("1")).is_err());

        let mut inactivo = cliente(TIPO_CREDITO, "10000", "0");
        inactivo.activo = false;
        assert!(check_credit_limit(&inactivo, &dec("1")).is_err());
    }

    #[test]
    fn test_apply_payment() {
        assert_eq!(apply_payment(&dec("1500"), &dec("500")).unwrap(), dec("1000"));
        assert_eq!(apply_payment(&dec("1500"), &dec("1500")).unwrap(), dec("0"));
        assert!(apply_payment(&dec("1500"), &dec("1500.01")).is_err());
        assert!(apply_payment(&dec("1500"), &dec("0")).is_err());
    }

    #[tokio::test]
    async fn test_pago_rejects_zero_amount_before_db() {
        use crate::core::shared::test_utils::test_state;
        use axum::body::Body;
        use axum::http::{header, Request};
        use tower::ServiceExt;

        let app = configure_credits_routes().with_state(test_state());
        let response = app
            .oneshot(
                Request::post("/api/creditos/1/pagos")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"monto_pagado":0,"metodo_pago":"Efectivo"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
