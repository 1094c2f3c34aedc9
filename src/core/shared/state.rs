use anyhow::Result;
use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::shared::utils::DbPool;
#[cfg(feature = "invoicing")]
use crate::invoicing::FacturaClient;
use crate::security::auth_api::AuthConfig;
use crate::security::jwt::{JwtConfig, JwtManager};

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub auth: Arc<AuthConfig>,
    pub jwt: Arc<JwtManager>,
    #[cfg(feature = "invoicing")]
    pub factura: Arc<FacturaClient>,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig) -> Result<Self> {
        let jwt_config = JwtConfig {
            token_expiry_hours: config.auth.token_expiry_hours,
            ..JwtConfig::default()
        };
        let jwt = JwtManager::new(jwt_config, &config.auth.jwt_secret)?;
        let auth = AuthConfig::from_settings(&config.auth);
        #[cfg(feature = "invoicing")]
        let factura = FacturaClient::new(config.factura.clone())?;

        Ok(Self {
            conn,
            auth: Arc::new(auth),
            jwt: Arc::new(jwt),
            #[cfg(feature = "invoicing")]
            factura: Arc::new(factura),
            config,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}
