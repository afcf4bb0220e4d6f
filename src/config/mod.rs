use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub query: QueryConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub log_dropped_params: bool,
    pub policy_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StorageBackend::Postgres),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub slow_query_threshold_ms: u64,
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        Self::defaults(environment).with_env_overrides()
    }

    pub fn defaults(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from any variable source.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        // Query overrides
        if let Some(v) = var("QUERY_LOG_DROPPED_PARAMS") {
            self.query.log_dropped_params = v.parse().unwrap_or(self.query.log_dropped_params);
        }
        if let Some(v) = var("QUERY_POLICY_FILE") {
            self.query.policy_file = non_empty(v).map(PathBuf::from);
        }

        // Database overrides
        if let Some(v) = var("STORAGE_BACKEND") {
            self.database.backend = v.parse().unwrap_or(self.database.backend);
        }
        if let Some(v) = var("DATABASE_URL") {
            self.database.url = non_empty(v);
        }
        if let Some(v) = var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Some(v) = var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Some(v) = var("DATABASE_SLOW_QUERY_THRESHOLD_MS") {
            self.database.slow_query_threshold_ms = v.parse().unwrap_or(self.database.slow_query_threshold_ms);
        }
        if let Some(v) = var("SEED_FILE") {
            self.database.seed_file = non_empty(v).map(PathBuf::from);
        }

        // API overrides
        if let Some(v) = var("PORT") {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Some(v) = var("BUILDTRACK_PORT") {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Some(v) = var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Security overrides
        if let Some(v) = var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Some(v) = var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            query: QueryConfig {
                log_dropped_params: true,
                policy_file: None,
            },
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                slow_query_threshold_ms: 100,
                seed_file: None,
            },
            api: ApiConfig {
                port: 5000,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            query: QueryConfig {
                log_dropped_params: true,
                policy_file: None,
            },
            database: DatabaseConfig {
                backend: StorageBackend::Postgres,
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                slow_query_threshold_ms: 500,
                seed_file: None,
            },
            api: ApiConfig {
                port: 5000,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.buildtrack.app".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            query: QueryConfig {
                log_dropped_params: false,
                policy_file: None,
            },
            database: DatabaseConfig {
                backend: StorageBackend::Postgres,
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                slow_query_threshold_ms: 1000,
                seed_file: None,
            },
            api: ApiConfig {
                port: 5000,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://app.buildtrack.app".to_string()],
            },
        }
    }
}

fn non_empty(v: String) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_vars(base: AppConfig, vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        base.with_overrides(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.query.log_dropped_params);
        assert_eq!(config.database.backend, StorageBackend::Memory);
        assert_eq!(config.api.port, 5000);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.query.log_dropped_params);
        assert_eq!(config.database.backend, StorageBackend::Postgres);
        assert!(!config.api.enable_request_logging);
    }

    #[test]
    fn test_env_overrides() {
        let config = with_vars(
            AppConfig::development(),
            &[
                ("STORAGE_BACKEND", "postgres"),
                ("DATABASE_URL", "postgres://localhost/buildtrack"),
                ("DATABASE_SLOW_QUERY_THRESHOLD_MS", "250"),
                ("PORT", "8080"),
                ("QUERY_LOG_DROPPED_PARAMS", "false"),
                ("SECURITY_CORS_ORIGINS", "https://a.example, https://b.example,"),
                ("SEED_FILE", "fixtures/seed.json"),
            ],
        );
        assert_eq!(config.database.backend, StorageBackend::Postgres);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/buildtrack"));
        assert_eq!(config.database.slow_query_threshold_ms, 250);
        assert_eq!(config.api.port, 8080);
        assert!(!config.query.log_dropped_params);
        assert_eq!(config.security.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.database.seed_file, Some(PathBuf::from("fixtures/seed.json")));
    }

    #[test]
    fn test_invalid_overrides_keep_defaults() {
        let config = with_vars(
            AppConfig::staging(),
            &[("DATABASE_MAX_CONNECTIONS", "lots"), ("STORAGE_BACKEND", "mongo"), ("PORT", "-1")],
        );
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.backend, StorageBackend::Postgres);
        assert_eq!(config.api.port, 5000);
    }

    #[test]
    fn test_specific_port_wins() {
        let config = with_vars(AppConfig::development(), &[("PORT", "8080"), ("BUILDTRACK_PORT", "9090")]);
        assert_eq!(config.api.port, 9090);
    }
}
