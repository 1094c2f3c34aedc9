use anyhow::{Context, Result};
use log::warn;
use std::env;

pub const DEFAULT_DATABASE_URL: &str = "postgres://postgres:@localhost:5432/baterias_db";
pub const DEFAULT_FACTURA_API_URL: &str = "https://sandbox.factura.com/api/v4";
const DEV_JWT_SECRET: &str = "dev-secret-key-change-in-production-minimum-32-chars";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthSettings,
    pub factura: FacturaConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Clone, Debug)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
    pub require_auth: bool,
}

/// Credentials for the Factura.com CFDI API. Missing keys are kept as `None`
/// so the proxy can answer with a configuration error instead of calling out.
#[derive(Clone, Debug, Default)]
pub struct FacturaConfig {
    pub base_url: String,
    pub plugin: Option<String>,
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                cors_allowed_origins: default_cors_origins(),
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: 10,
                run_migrations: true,
            },
            auth: AuthSettings {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                token_expiry_hours: 24,
                require_auth: false,
            },
            factura: FacturaConfig {
                base_url: DEFAULT_FACTURA_API_URL.to_string(),
                plugin: None,
                api_key: None,
                secret_key: None,
                timeout_secs: 30,
            },
        }
    }
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, default: bool) -> bool {
    match non_empty_var(key) {
        Some(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    /// Reads the configuration from the process environment. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let jwt_secret = non_empty_var("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set, using default development secret - DO NOT USE IN PRODUCTION");
            defaults.auth.jwt_secret.clone()
        });

        let cors_allowed_origins = non_empty_var("CORS_ALLOWED_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or(defaults.server.cors_allowed_origins);

        Ok(Self {
            server: ServerConfig {
                host: non_empty_var("HOST").unwrap_or(defaults.server.host),
                port: parse_var("PORT", defaults.server.port)?,
                cors_allowed_origins,
            },
            database: DatabaseConfig {
                url: non_empty_var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_var(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
                run_migrations: parse_flag("RUN_MIGRATIONS", defaults.database.run_migrations),
            },
            auth: AuthSettings {
                jwt_secret,
                token_expiry_hours: parse_var(
                    "JWT_EXPIRY_HOURS",
                    defaults.auth.token_expiry_hours,
                )?,
                require_auth: parse_flag("REQUIRE_AUTH", defaults.auth.require_auth),
            },
            factura: FacturaConfig {
                base_url: non_empty_var("FACTURA_API_URL")
                    .unwrap_or(defaults.factura.base_url)
                    .trim_end_matches('/')
                    .to_string(),
                plugin: non_empty_var("F_PLUGIN"),
                api_key: non_empty_var("F_API_KEY"),
                secret_key: non_empty_var("F_SECRET_KEY"),
                timeout_secs: parse_var("FACTURA_TIMEOUT_SECS", defaults.factura.timeout_secs)?,
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_legacy_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.token_expiry_hours, 24);
        assert!(!config.auth.require_auth);
        assert_eq!(config.factura.base_url, DEFAULT_FACTURA_API_URL);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.server.cors_allowed_origins.len(), 2);
    }

    #[test]
    fn test_split_list_trims_and_skips_empty() {
        assert_eq!(
            split_list(" http://a.test , ,http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
