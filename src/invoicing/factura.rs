use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, error, warn};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::config::FacturaConfig;

#[derive(Debug, thiserror::Error)]
pub enum FacturaError {
    #[error("API keys no configuradas")]
    MissingCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("No se pudo conectar con el servicio")]
    Unreachable,
    #[error("Error al procesar la solicitud")]
    Internal(String),
}

impl FacturaError {
    /// Maps a non-2xx upstream answer to the message shown to callers.
    pub fn from_upstream(status: u16, body: &Value) -> Self {
        let message = match status {
            400 => "Solicitud inválida".to_string(),
            401 => "No autorizado".to_string(),
            404 => "CFDI no encontrado".to_string(),
            429 => "Demasiadas solicitudes".to_string(),
            _ => body
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("Error del servidor")
                .to_string(),
        };
        Self::Upstream { status, message }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredentials | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Unreachable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<reqwest::Error> for FacturaError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            warn!("Factura.com unreachable: {e}");
            Self::Unreachable
        } else {
            Self::Internal(e.to_string())
        }
    }
}

impl IntoResponse for FacturaError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!("CFDI proxy failure: {detail}");
        }
        let body = json!({ "status": "error", "message": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    plugin: String,
    api_key: String,
    secret_key: String,
}

pub struct FacturaClient {
    http: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl std::fmt::Debug for FacturaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacturaClient")
            .field("base_url", &self.base_url)
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl FacturaClient {
    pub fn new(config: FacturaConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("baterias-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let credentials = match (config.plugin, config.api_key, config.secret_key) {
            (Some(plugin), Some(api_key), Some(secret_key)) => Some(Credentials {
                plugin,
                api_key,
                secret_key,
            }),
            _ => {
                warn!("F_PLUGIN, F_API_KEY or F_SECRET_KEY not set, CFDI proxy disabled");
                None
            }
        };

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, FacturaError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(FacturaError::MissingCredentials)?;
        Ok(builder
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("F-PLUGIN", &creds.plugin)
            .header("F-Api-Key", &creds.api_key)
            .header("F-Secret-Key", &creds.secret_key))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, FacturaError> {
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            debug!("Factura.com answered {status}: {body}");
            Err(FacturaError::from_upstream(status, &body))
        }
    }

    /// `GET {base}/{segments...}` with optional query parameters.
    pub async fn get<Q>(&self, segments: &[&str], query: Option<&Q>) -> Result<Value, FacturaError>
    where
        Q: Serialize + ?Sized,
    {
        let mut builder = self.http.get(self.url(segments));
        if let Some(query) = query {
            builder = builder.query(query);
        }
        let builder = self.authorized(builder)?;
        self.send(builder).await
    }

    pub async fn post(&self, segments: &[&str], body: &Value) -> Result<Value, FacturaError> {
        let builder = self.authorized(self.http.post(self.url(segments)).json(body))?;
        self.send(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> FacturaConfig {
        FacturaConfig {
            base_url: base_url.to_string(),
            plugin: Some("plugin-1".into()),
            api_key: Some("key-1".into()),
            secret_key: Some("secret-1".into()),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_upstream_messages() {
        let body = json!({ "message": "RFC bloqueado" });
        let cases = [
            (400, "Solicitud inválida"),
            (401, "No autorizado"),
            (404, "CFDI no encontrado"),
            (429, "Demasiadas solicitudes"),
            (422, "RFC bloqueado"),
        ];
        for (status, expected) in cases {
            let err = FacturaError::from_upstream(status, &body);
            assert_eq!(err.to_string(), expected);
            assert_eq!(err.status_code().as_u16(), status);
        }
        let err = FacturaError::from_upstream(502, &Value::String("<html>".into()));
        assert_eq!(err.to_string(), "Error del servidor");
    }

    #[test]
    fn test_segments_are_encoded() {
        let client = FacturaClient::new(config("https://api.test/v4/")).unwrap();
        assert_eq!(
            client.url(&["cfdi", "folio", "A 12/3"]),
            "https://api.test/v4/cfdi/folio/A%2012%2F3"
        );
    }

    #[tokio::test]
    async fn test_get_sends_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cfdi/uid/abc")
            .match_header("F-PLUGIN", "plugin-1")
            .match_header("F-Api-Key", "key-1")
            .match_header("F-Secret-Key", "secret-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"UUID":"1234"}"#)
            .create_async()
            .await;

        let client = FacturaClient::new(config(&server.url())).unwrap();
        let data = client.get::<()>(&["cfdi", "uid", "abc"], None).await.unwrap();
        assert_eq!(data["UUID"], "1234");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_credentials_never_calls_upstream() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut cfg = config(&server.url());
        cfg.secret_key = None;
        let client = FacturaClient::new(cfg).unwrap();
        assert!(!client.is_configured());
        let err = client
            .get::<()>(&["cfdi", "uid", "abc"], None)
            .await
            .unwrap_err();
        assert!(matches!(err, FacturaError::MissingCredentials));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_upstream_maps_to_503() {
        let client = FacturaClient::new(config("http://127.0.0.1:1")).unwrap();
        let err = client
            .post(&["cfdi40", "create"], &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, FacturaError::Unreachable));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
