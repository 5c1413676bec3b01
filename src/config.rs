use crate::error::ConfigError;
use std::net::SocketAddr;

// --- Server configuration, read once at startup ---

pub const API_KEY_VAR: &str = "API_KEY";
pub const MODEL_VAR: &str = "IMAGECHAT_MODEL";
pub const BIND_VAR: &str = "IMAGECHAT_BIND";
pub const API_BASE_VAR: &str = "IMAGECHAT_API_BASE";
pub const MAX_UPLOAD_VAR: &str = "IMAGECHAT_MAX_UPLOAD_BYTES";

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
// The page advertises "less than 10mb"
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub api_key: String,
    pub model: String,
    pub bind: SocketAddr,
    pub api_base: String,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("Ignoring unreadable .env file: {}", e),
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get(API_KEY_VAR).ok_or(ConfigError::MissingVariable(API_KEY_VAR))?;
        let model = get(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let bind_str = get(BIND_VAR).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_str.parse::<SocketAddr>().map_err(|e| ConfigError::InvalidValue {
            name: BIND_VAR,
            reason: format!("'{}': {}", bind_str, e),
        })?;

        let api_base = get(API_BASE_VAR)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let max_upload_bytes = match get(MAX_UPLOAD_VAR) {
            Some(raw) => raw.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
                name: MAX_UPLOAD_VAR,
                reason: format!("'{}': {}", raw, e),
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            api_key,
            model,
            bind,
            api_base,
            max_upload_bytes,
        })
    }
}
