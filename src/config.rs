//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:4000/api";

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Storefront origin used when building payment return URLs
    pub public_base_url: Option<String>,
}

/// Backend REST API configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout: u64, // seconds
    pub status_max_retries: u32,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub redis_url: String,
    pub max_connections: u32,
    pub ledger_ttl: u64, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Orders-enabled scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub service_key: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            backend: BackendConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            scheduler: SchedulerConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.backend.validate()?;
        self.cache.validate()?;
        self.logging.validate()?;
        self.scheduler.validate()?;

        Ok(())
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn parse_flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env_non_empty(name) {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(name.to_string())),
        },
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("SERVER_PORT", "8000")?,
            public_base_url: env_non_empty("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(BackendConfig {
            base_url: resolve_backend_url(env_non_empty),
            request_timeout: parse_env("BACKEND_TIMEOUT_SECS", "30")?,
            status_max_retries: parse_env("BACKEND_STATUS_MAX_RETRIES", "3")?,
        })
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: 30,
            status_max_retries: 3,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "API_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue("BACKEND_TIMEOUT_SECS".to_string()));
        }

        if self.status_max_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "BACKEND_STATUS_MAX_RETRIES".to_string(),
            ));
        }

        Ok(())
    }
}

/// Resolves the backend base URL from the first non-empty of
/// `API_BASE_URL`, `NEXT_PUBLIC_API_BASE`, `NEXT_PUBLIC_API_URL`.
pub fn resolve_backend_url(lookup: impl Fn(&str) -> Option<String>) -> String {
    ["API_BASE_URL", "NEXT_PUBLIC_API_BASE", "NEXT_PUBLIC_API_URL"]
        .iter()
        .find_map(|name| lookup(name))
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CacheConfig {
            enabled: parse_flag("CACHE_ENABLED", false)?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            max_connections: parse_env("CACHE_MAX_CONNECTIONS", "10")?,
            ledger_ttl: parse_env("PAYMENT_LEDGER_TTL_SECS", "604800")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        if self.redis_url.is_empty() {
            return Err(ConfigError::InvalidValue("REDIS_URL".to_string()));
        }

        // Basic validation of Redis URL format
        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(ConfigError::InvalidValue(
                "REDIS_URL must start with redis:// or rediss://".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "CACHE_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(SchedulerConfig {
            enabled: parse_flag("ORDER_SCHEDULER_ENABLED", false)?,
            interval_secs: parse_env("ORDER_SCHEDULER_INTERVAL_SECS", "300")?,
            service_key: env_non_empty("SERVICE_API_KEY").or_else(|| env_non_empty("ADMIN_API_KEY")),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        if self.service_key.is_none() {
            return Err(ConfigError::MissingVariable(
                "SERVICE_API_KEY or ADMIN_API_KEY".to_string(),
            ));
        }

        if self.interval_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "ORDER_SCHEDULER_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            public_base_url: None,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            public_base_url: None,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_url_precedence() {
        let lookup = lookup_from(&[
            ("NEXT_PUBLIC_API_URL", "http://fallback/api"),
            ("NEXT_PUBLIC_API_BASE", "http://next-base/api/"),
        ]);
        assert_eq!(resolve_backend_url(lookup), "http://next-base/api");

        let lookup = lookup_from(&[
            ("API_BASE_URL", "https://api.nihemart.rw/api"),
            ("NEXT_PUBLIC_API_BASE", "http://next-base/api"),
        ]);
        assert_eq!(resolve_backend_url(lookup), "https://api.nihemart.rw/api");

        assert_eq!(resolve_backend_url(lookup_from(&[])), DEFAULT_BACKEND_URL);
    }

    #[test]
    fn test_backend_config_rejects_non_http_url() {
        let mut config = BackendConfig::new("ftp://example.com");
        assert!(config.validate().is_err());

        config.base_url = "http://localhost:4000/api".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheduler_requires_service_key_when_enabled() {
        let mut config = SchedulerConfig {
            enabled: true,
            interval_secs: 300,
            service_key: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingVariable(_))
        ));

        config.service_key = Some("svc".to_string());
        assert!(config.validate().is_ok());

        config.enabled = false;
        config.service_key = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled_cache_skips_url_validation() {
        let config = CacheConfig {
            enabled: false,
            redis_url: String::new(),
            max_connections: 10,
            ledger_ttl: 60,
        };
        assert!(config.validate().is_ok());
    }
}
