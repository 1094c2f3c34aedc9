//! End-to-end stock flows against a real PostgreSQL database.
//!
//! Set `TEST_DATABASE_URL` to a disposable database to run them; they are
//! skipped otherwise.

#[cfg(test)]
mod stock_flow_integration_tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use baterias::core::config::AppConfig;
    use baterias::core::shared::state::AppState;
    use baterias::core::shared::utils::{create_conn, run_migrations};
    use baterias::main_module::build_app;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app() -> Option<Router> {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => {
                println!("Skipping test - TEST_DATABASE_URL not set");
                return None;
            }
        };
        let mut config = AppConfig::default();
        config.database.url = url;
        config.database.max_connections = 2;
        config.auth.jwt_secret = "integration-secret-key-with-32-characters".to_string();

        let pool = match create_conn(&config.database) {
            Ok(pool) => pool,
            Err(e) => {
                println!("Skipping test - cannot connect to database: {e}");
                return None;
            }
        };
        run_migrations(&pool).ok()?;
        let state = AppState::new(pool, config).ok()?;
        Some(build_app(Arc::new(state)))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn id(value: &Value, field: &str) -> i64 {
        value[field].as_i64().unwrap_or_else(|| panic!("missing {field} in {value}"))
    }

    fn num(value: &Value, field: &str) -> f64 {
        match &value[field] {
            Value::String(s) => s.parse().unwrap(),
            other => other.as_f64().unwrap_or_else(|| panic!("missing {field} in {value}")),
        }
    }

    fn stock(value: &Value) -> f64 {
        num(value, "stock")
    }

    struct Fixture {
        producto: i64,
        origen: i64,
        destino: i64,
        cliente: i64,
        inventario: i64,
    }

    async fn producto(app: &Router, nombre: &str) -> i64 {
        let (_, categoria) = call(app, Method::POST, "/api/categorias", Some(json!({ "nombre_categoria": "Automotriz" }))).await;
        let (_, unidad) = call(app, Method::POST, "/api/unidades-medida", Some(json!({ "unidad": "pieza" }))).await;
        let (status, producto) = call(
            app,
            Method::POST,
            "/api/productos",
            Some(json!({
                "nombre": nombre,
                "precio_venta": 2450.0,
                "costo": 1800.0,
                "id_unidad": id(&unidad, "id_unidad"),
                "id_categoria": id(&categoria, "id_categoria")
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{producto}");
        id(&producto, "id_producto")
    }

    async fn inventario(app: &Router, producto: i64, sucursal: i64, stock_inicial: f64) -> i64 {
        let (status, inventario) = call(
            app,
            Method::POST,
            "/api/inventario",
            Some(json!({
                "id_producto": producto,
                "id_sucursal": sucursal,
                "stock": stock_inicial
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{inventario}");
        id(&inventario, "id_inventario")
    }

    async fn cliente_credito(app: &Router, limite: f64) -> i64 {
        let (status, cliente) = call(
            app,
            Method::POST,
            "/api/clientes",
            Some(json!({
                "nombre": "Transportes del Bajío",
                "tipo_cliente": "credito",
                "limite_credito": limite
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{cliente}");
        id(&cliente, "id_cliente")
    }

    async fn fixture(app: &Router, stock_inicial: f64) -> Fixture {
        let producto = producto(app, "LTH L-47").await;
        let (_, origen) = call(app, Method::POST, "/api/sucursales", Some(json!({ "nombre": "Centro" }))).await;
        let (_, destino) = call(app, Method::POST, "/api/sucursales", Some(json!({ "nombre": "Norte" }))).await;
        let (_, cliente) = call(app, Method::POST, "/api/clientes", Some(json!({ "nombre": "Taller Díaz" }))).await;
        let origen = id(&origen, "id_sucursal");
        let inventario = inventario(app, producto, origen, stock_inicial).await;

        Fixture {
            producto,
            origen,
            destino: id(&destino, "id_sucursal"),
            cliente: id(&cliente, "id_cliente"),
            inventario,
        }
    }

    async fn stock_of(app: &Router, inventario: i64) -> f64 {
        let (_, inv) = call(app, Method::GET, &format!("/api/inventario/{inventario}"), None).await;
        stock(&inv)
    }

    async fn count(app: &Router, uri: &str) -> usize {
        let (status, rows) = call(app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK, "{rows}");
        rows.as_array().map(Vec::len).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_sale_withdraws_stock_and_rolls_back_on_shortage() {
        let Some(app) = test_app() else { return };
        let f = fixture(&app, 5.0).await;

        let venta = |cantidad: i64| {
            json!({
                "id_cliente": f.cliente,
                "id_sucursal": f.origen,
                "id_tipo_pago": 1,
                "detalles": [{ "id_producto": f.producto, "cantidad": cantidad, "precio_unitario": 2450.0 }]
            })
        };

        let (status, body) = call(&app, Method::POST, "/api/ventas", Some(venta(3))).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["detalles"].as_array().map(Vec::len), Some(1));

        let uri = format!("/api/inventario/{}", f.inventario);
        let (_, inv) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(stock(&inv), 2.0);

        let (status, body) = call(&app, Method::POST, "/api/ventas", Some(venta(3))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        let (_, inv) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(stock(&inv), 2.0);
    }

    #[tokio::test]
    async fn test_completed_transfer_moves_stock_once() {
        let Some(app) = test_app() else { return };
        let f = fixture(&app, 4.0).await;

        let (status, traspaso) = call(
            &app,
            Method::POST,
            "/api/traspasos",
            Some(json!({
                "id_sucursal_origen": f.origen,
                "id_sucursal_destino": f.destino,
                "detalles": [{ "id_producto": f.producto, "cantidad": 3 }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{traspaso}");
        assert_eq!(traspaso["estado"], "pendiente");

        let completar = format!("/api/traspasos/{}/completar", id(&traspaso, "id_traspaso"));
        let (status, body) = call(&app, Method::PUT, &completar, None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["estado"], "completado");

        let (status, _) = call(&app, Method::PUT, &completar, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, origen) = call(&app, Method::GET, &format!("/api/inventario/{}", f.inventario), None).await;
        assert_eq!(stock(&origen), 1.0);

        let (_, destino) = call(
            &app,
            Method::GET,
            &format!("/api/inventario/sucursal/{}", f.destino),
            None,
        )
        .await;
        let rows = destino.as_array().cloned().unwrap_or_default();
        assert_eq!(rows.len(), 1);
        assert_eq!(stock(&rows[0]), 3.0);
    }

    #[tokio::test]
    async fn test_multi_line_sale_saves_nothing_when_one_line_is_short() {
        let Some(app) = test_app() else { return };
        let f = fixture(&app, 10.0).await;
        let otro = producto(&app, "LTH L-65").await;
        let otro_inv = inventario(&app, otro, f.origen, 1.0).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/ventas",
            Some(json!({
                "id_cliente": f.cliente,
                "id_sucursal": f.origen,
                "id_tipo_pago": 1,
                "detalles": [
                    { "id_producto": f.producto, "cantidad": 4, "precio_unitario": 2450.0 },
                    { "id_producto": otro, "cantidad": 2, "precio_unitario": 3100.0 }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        assert_eq!(stock_of(&app, f.inventario).await, 10.0);
        assert_eq!(stock_of(&app, otro_inv).await, 1.0);
        assert_eq!(count(&app, &format!("/api/ventas/cliente/{}", f.cliente)).await, 0);
    }

    #[tokio::test]
    async fn test_credit_sale_charges_balance_and_respects_limit() {
        let Some(app) = test_app() else { return };
        let f = fixture(&app, 10.0).await;
        let cliente = cliente_credito(&app, 5000.0).await;

        let venta = |cantidad: i64| {
            json!({
                "id_cliente": cliente,
                "id_sucursal": f.origen,
                "id_tipo_pago": 4,
                "a_credito": true,
                "detalles": [{ "id_producto": f.producto, "cantidad": cantidad, "precio_unitario": 2000.0 }]
            })
        };

        let (status, body) = call(&app, Method::POST, "/api/ventas", Some(venta(2))).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let (_, cliente_row) = call(&app, Method::GET, &format!("/api/clientes/{cliente}"), None).await;
        assert_eq!(num(&cliente_row, "saldo_actual"), 4000.0);
        let (_, creditos) = call(&app, Method::GET, &format!("/api/creditos/cliente/{cliente}"), None).await;
        let creditos = creditos.as_array().cloned().unwrap_or_default();
        assert_eq!(creditos.len(), 1);
        assert_eq!(num(&creditos[0], "saldo_pendiente"), 4000.0);

        let (status, body) = call(&app, Method::POST, "/api/ventas", Some(venta(1))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"], "La venta excede el límite de crédito del cliente");

        assert_eq!(stock_of(&app, f.inventario).await, 8.0);
        let (_, cliente_row) = call(&app, Method::GET, &format!("/api/clientes/{cliente}"), None).await;
        assert_eq!(num(&cliente_row, "saldo_actual"), 4000.0);
        assert_eq!(count(&app, &format!("/api/ventas/cliente/{cliente}")).await, 1);
    }

    #[tokio::test]
    async fn test_payments_reduce_both_balances_and_reject_overpayment() {
        let Some(app) = test_app() else { return };
        let f = fixture(&app, 10.0).await;
        let cliente = cliente_credito(&app, 10000.0).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/ventas",
            Some(json!({
                "id_cliente": cliente,
                "id_sucursal": f.origen,
                "id_tipo_pago": 4,
                "a_credito": true,
                "detalles": [{ "id_producto": f.producto, "cantidad": 1, "precio_unitario": 3000.0 }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let (_, creditos) = call(&app, Method::GET, &format!("/api/creditos/cliente/{cliente}"), None).await;
        let credito = id(&creditos[0], "id_credito");
        let pagos = format!("/api/creditos/{credito}/pagos");

        let (status, body) = call(
            &app,
            Method::POST,
            &pagos,
            Some(json!({ "monto_pagado": 1200.0, "metodo_pago": "efectivo" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(num(&body, "saldo_pendiente"), 1800.0);
        assert_eq!(body["pagos"].as_array().map(Vec::len), Some(1));
        let (_, cliente_row) = call(&app, Method::GET, &format!("/api/clientes/{cliente}"), None).await;
        assert_eq!(num(&cliente_row, "saldo_actual"), 1800.0);

        let (status, body) = call(
            &app,
            Method::POST,
            &pagos,
            Some(json!({ "monto_pagado": 1800.01, "metodo_pago": "efectivo" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        let (_, credito_row) = call(&app, Method::GET, &format!("/api/creditos/{credito}"), None).await;
        assert_eq!(num(&credito_row, "saldo_pendiente"), 1800.0);
        assert_eq!(credito_row["pagos"].as_array().map(Vec::len), Some(1));
        let (_, cliente_row) = call(&app, Method::GET, &format!("/api/clientes/{cliente}"), None).await;
        assert_eq!(num(&cliente_row, "saldo_actual"), 1800.0);
    }

    #[tokio::test]
    async fn test_salida_beyond_stock_is_rejected_without_a_record() {
        let Some(app) = test_app() else { return };
        let f = fixture(&app, 3.0).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/movimientos-inventario",
            Some(json!({
                "id_producto": f.producto,
                "id_sucursal": f.origen,
                "id_tipo_movimiento": 2,
                "cantidad": 5
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        assert_eq!(stock_of(&app, f.inventario).await, 3.0);
        assert_eq!(
            count(&app, &format!("/api/movimientos-inventario/producto/{}", f.producto)).await,
            0
        );
    }

    #[tokio::test]
    async fn test_negative_adjustment_keeps_stock() {
        let Some(app) = test_app() else { return };
        let f = fixture(&app, 2.0).await;
        let ajuste = format!("/api/inventario/{}/sucursal/{}/ajuste", f.producto, f.origen);

        let (status, body) = call(&app, Method::PUT, &ajuste, Some(json!({ "cantidad": -5.0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"], "No hay suficiente stock disponible");
        assert_eq!(stock_of(&app, f.inventario).await, 2.0);

        let (status, body) = call(&app, Method::PUT, &ajuste, Some(json!({ "cantidad": -2.0 }))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(stock(&body), 0.0);
    }
}
