//! Server configuration.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults. A `.env` file, when present, is loaded by `main` first.

use std::env;
use std::path::PathBuf;

/// Used only in development when `JWT_SECRET` is unset.
const DEV_JWT_SECRET: &str = "barback-dev-secret-change-in-production";

/// Shortest secret accepted in production (HS256 wants at least 256 bits).
const MIN_JWT_SECRET_BYTES: usize = 32;

/// Where the server runs. Controls error detail exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Which store the server starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,

    pub environment: Environment,

    pub store: StoreKind,

    /// SQLite file path
    pub db_path: PathBuf,

    /// Start on the in-memory store if SQLite cannot be opened
    pub store_fallback: bool,

    /// JWT secret key for signing tokens
    pub jwt_secret: String,

    /// JWT access token lifetime in seconds
    pub jwt_access_ttl_secs: i64,

    /// Enables LLM narratives when set
    pub openai_api_key: Option<String>,

    pub openai_model: String,

    pub openai_base_url: String,

    pub stripe_api_base: String,

    /// Allowed browser origin; any origin when unset
    pub cors_origin: Option<String>,

    /// Hosts the scrape passthrough may fetch, lowercase
    pub saq_allowed_hosts: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let environment = match var("BARBACK_ENV").as_deref().map(str::trim) {
            None | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(_) => return Err(ConfigError::InvalidValue("BARBACK_ENV".to_string())),
        };

        let store = match var("BARBACK_STORE").as_deref().map(str::trim) {
            None | Some("sqlite") => StoreKind::Sqlite,
            Some("memory") => StoreKind::Memory,
            Some(_) => return Err(ConfigError::InvalidValue("BARBACK_STORE".to_string())),
        };

        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) => {
                if environment == Environment::Production && secret.len() < MIN_JWT_SECRET_BYTES {
                    return Err(ConfigError::InvalidValue("JWT_SECRET".to_string()));
                }
                secret
            }
            None if environment == Environment::Production => {
                return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
            }
            None => DEV_JWT_SECRET.to_string(),
        };

        let config = ServerConfig {
            host: var("BARBACK_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),

            port: var("BARBACK_PORT")
                .unwrap_or_else(|| "3001".to_string())
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BARBACK_PORT".to_string()))?,

            environment,

            store,

            db_path: PathBuf::from(var("BARBACK_DB_PATH").unwrap_or_else(|| "./data/barback.db".to_string())),

            store_fallback: var("BARBACK_STORE_FALLBACK")
                .unwrap_or_else(|| "true".to_string())
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BARBACK_STORE_FALLBACK".to_string()))?,

            jwt_secret,

            jwt_access_ttl_secs: var("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|| "43200".to_string()) // 12 hours, one bar shift
                .trim()
                .parse()
                .ok()
                .filter(|secs: &i64| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidValue("JWT_ACCESS_TTL_SECS".to_string()))?,

            openai_api_key: var("OPENAI_API_KEY"),

            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),

            openai_base_url: trim_base(var("OPENAI_BASE_URL"), "https://api.openai.com/v1"),

            stripe_api_base: trim_base(var("STRIPE_API_BASE"), "https://api.stripe.com/v1"),

            cors_origin: var("CORS_ORIGIN"),

            saq_allowed_hosts: var("SAQ_ALLOWED_HOSTS")
                .unwrap_or_else(|| "www.saq.com,saq.com".to_string())
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        };

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn trim_base(value: Option<String>, default: &str) -> String {
    value.unwrap_or_else(|| default.to_string()).trim().trim_end_matches('/').to_string()
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert!(config.is_development());
        assert_eq!(config.store, StoreKind::Sqlite);
        assert!(config.store_fallback);
        assert_eq!(config.jwt_access_ttl_secs, 43200);
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.saq_allowed_hosts, vec!["www.saq.com", "saq.com"]);
    }

    #[test]
    fn test_production_requires_strong_secret() {
        assert!(matches!(
            load(&[("BARBACK_ENV", "production")]),
            Err(ConfigError::MissingRequired(_))
        ));
        assert!(matches!(
            load(&[("BARBACK_ENV", "production"), ("JWT_SECRET", "short")]),
            Err(ConfigError::InvalidValue(_))
        ));

        let secret = "x".repeat(32);
        let config = load(&[("BARBACK_ENV", "production"), ("JWT_SECRET", &secret)]).unwrap();
        assert!(!config.is_development());
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("BARBACK_PORT", "eighty")]).is_err());
        assert!(load(&[("BARBACK_STORE", "postgres")]).is_err());
        assert!(load(&[("JWT_ACCESS_TTL_SECS", "0")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("BARBACK_STORE", "memory"),
            ("BARBACK_STORE_FALLBACK", "false"),
            ("STRIPE_API_BASE", "http://localhost:12111/v1/"),
            ("SAQ_ALLOWED_HOSTS", " WWW.SAQ.COM , "),
        ])
        .unwrap();

        assert_eq!(config.store, StoreKind::Memory);
        assert!(!config.store_fallback);
        assert_eq!(config.stripe_api_base, "http://localhost:12111/v1");
        assert_eq!(config.saq_allowed_hosts, vec!["www.saq.com"]);
    }
}
