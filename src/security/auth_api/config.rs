use crate::core::config::AuthSettings;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub require_auth: bool,
    pub bearer_prefix: String,
    pub allow_anonymous_paths: Vec<String>,
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_auth: false,
            bearer_prefix: "Bearer ".to_string(),
            allow_anonymous_paths: vec![
                "/health".to_string(),
                "/api/health".to_string(),
                "/api/usuarios/login".to_string(),
                "/api/usuarios/register".to_string(),
            ],
            public_paths: vec!["/".to_string(), "/favicon.ico".to_string()],
        }
    }
}

impl AuthConfig {
    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::default().with_require_auth(settings.require_auth)
    }

    pub fn with_require_auth(mut self, require: bool) -> Self {
        self.require_auth = require;
        self
    }

    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|public_path| path == public_path)
    }

    pub fn is_anonymous_allowed(&self, path: &str) -> bool {
        self.allow_anonymous_paths.iter().any(|allowed_path| {
            path == allowed_path || path.starts_with(&format!("{allowed_path}/"))
        })
    }
}
