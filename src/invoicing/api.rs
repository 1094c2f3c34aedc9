use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::factura::FacturaError;
use crate::core::shared::state::AppState;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PER_PAGE: u32 = 100;

/// Body of `POST /api/cfdi/list`. Month and year arrive as numbers or
/// strings depending on the client, so they are kept as raw JSON.
#[derive(Debug, Default, Deserialize)]
pub struct ListCfdiRequest {
    pub month: Option<Value>,
    pub year: Option<Value>,
    pub rfc: Option<String>,
    pub page: Option<Value>,
    pub per_page: Option<Value>,
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

impl ListCfdiRequest {
    /// Query parameters forwarded to `cfdi/list`.
    pub fn query(&self) -> Result<Vec<(&'static str, String)>, FacturaError> {
        let month = self.month.as_ref().and_then(scalar);
        let year = self.year.as_ref().and_then(scalar);
        let rfc = self
            .rfc
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        let (Some(month), Some(year), Some(rfc)) = (month, year, rfc) else {
            return Err(FacturaError::Validation(
                "Se requieren los campos month, year y rfc".to_string(),
            ));
        };
        let page = self
            .page
            .as_ref()
            .and_then(scalar)
            .unwrap_or_else(|| DEFAULT_PAGE.to_string());
        let per_page = self
            .per_page
            .as_ref()
            .and_then(scalar)
            .unwrap_or_else(|| DEFAULT_PER_PAGE.to_string());
        Ok(vec![
            ("month", month),
            ("year", year),
            ("rfc", rfc.to_string()),
            ("page", page),
            ("per_page", per_page),
        ])
    }
}

fn success(data: Value) -> Json<Value> {
    Json(json!({ "status": "success", "data": data }))
}

fn require_configured(state: &AppState) -> Result<(), FacturaError> {
    if state.factura.is_configured() {
        Ok(())
    } else {
        Err(FacturaError::MissingCredentials)
    }
}

pub async fn get_by_uid(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<Value>, FacturaError> {
    let data = state
        .factura
        .get::<()>(&["cfdi", "uid", uid.as_str()], None)
        .await?;
    Ok(success(data))
}

pub async fn get_by_uuid(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Value>, FacturaError> {
    let data = state
        .factura
        .get::<()>(&["cfdi", "uuid", uuid.as_str()], None)
        .await?;
    Ok(success(data))
}

pub async fn get_by_folio(
    State(state): State<Arc<AppState>>,
    Path(folio): Path<String>,
) -> Result<Json<Value>, FacturaError> {
    let data = state
        .factura
        .get::<()>(&["cfdi", "folio", folio.as_str()], None)
        .await?;
    Ok(success(data))
}

pub async fn list_cfdis(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ListCfdiRequest>,
) -> Result<Json<Value>, FacturaError> {
    require_configured(&state)?;
    let query = req.query()?;
    let data = state.factura.get(&["cfdi", "list"], Some(&query)).await?;
    Ok(success(data))
}

pub async fn create_cfdi(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, FacturaError> {
    let data = state.factura.post(&["cfdi40", "create"], &body).await?;
    log::info!("CFDI 4.0 created through Factura.com");
    Ok(success(data))
}

pub fn configure_invoicing_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/cfdi/uid/:uid", get(get_by_uid))
        .route("/api/cfdi/uuid/:uuid", get(get_by_uuid))
        .route("/api/cfdi/folio/:folio", get(get_by_folio))
        .route("/api/cfdi/list", post(list_cfdis))
        .route("/api/cfdi/create", post(create_cfdi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::shared::test_utils::test_state_with;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn configured(base_url: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.factura.base_url = base_url.to_string();
        config.factura.plugin = Some("plugin-1".into());
        config.factura.api_key = Some("key-1".into());
        config.factura.secret_key = Some("secret-1".into());
        config
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_list_query_defaults() {
        let req: ListCfdiRequest = serde_json::from_value(json!({
            "month": 5, "year": "2024", "rfc": "XAXX010101000"
        }))
        .unwrap();
        let query = req.query().unwrap();
        assert_eq!(query[0], ("month", "5".to_string()));
        assert_eq!(query[1], ("year", "2024".to_string()));
        assert_eq!(query[3], ("page", "1".to_string()));
        assert_eq!(query[4], ("per_page", "100".to_string()));
    }

    #[test]
    fn test_list_query_requires_fields() {
        let req: ListCfdiRequest =
            serde_json::from_value(json!({ "month": 5, "rfc": "" })).unwrap();
        assert!(matches!(req.query(), Err(FacturaError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_keys_answer_500() {
        let app = configure_invoicing_routes().with_state(test_state_with(AppConfig::default()));
        let response = app
            .oneshot(Request::get("/api/cfdi/uid/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "API keys no configuradas");
    }

    #[tokio::test]
    async fn test_list_forwards_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cfdi/list")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("month".into(), "5".into()),
                mockito::Matcher::UrlEncoded("year".into(), "2024".into()),
                mockito::Matcher::UrlEncoded("rfc".into(), "XAXX010101000".into()),
                mockito::Matcher::UrlEncoded("per_page".into(), "100".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"total":0,"data":[]}"#)
            .create_async()
            .await;

        let app = configure_invoicing_routes().with_state(test_state_with(configured(&server.url())));
        let response = app
            .oneshot(post_json(
                "/api/cfdi/list",
                r#"{"month":5,"year":2024,"rfc":"XAXX010101000"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["total"], 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_validation_is_400() {
        let app = configure_invoicing_routes()
            .with_state(test_state_with(configured("http://127.0.0.1:1")));
        let response = app
            .oneshot(post_json("/api/cfdi/list", r#"{"month":5}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Se requieren los campos month, year y rfc");
    }

    #[tokio::test]
    async fn test_create_maps_upstream_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/cfdi40/create")
            .match_header("F-Api-Key", "key-1")
            .with_status(404)
            .with_body(r#"{"message":"no existe"}"#)
            .create_async()
            .await;

        let app = configure_invoicing_routes().with_state(test_state_with(configured(&server.url())));
        let response = app
            .oneshot(post_json("/api/cfdi/create", r#"{"Receptor":{"UID":"x"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["message"], "CFDI no encontrado");
    }
}
