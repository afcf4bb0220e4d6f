use std::sync::Arc;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::{AppConfig, SecurityConfig, StorageBackend};
use crate::database::{DatabaseManager, MemoryStore, PgStore, Store};
use crate::handlers;
use crate::query::PolicyRegistry;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub policies: Arc<PolicyRegistry>,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(policies: PolicyRegistry, store: Arc<dyn Store>) -> Self {
        Self { policies: Arc::new(policies), store }
    }

    /// Loads the policy table and opens the configured storage backend.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let policies = match &config.query.policy_file {
            Some(path) => PolicyRegistry::load(path)?,
            None => PolicyRegistry::builtin()?,
        };
        info!("Loaded {} query policies", policies.len());

        let store: Arc<dyn Store> = match config.database.backend {
            StorageBackend::Memory => {
                let store = MemoryStore::new(policies.entities());
                if let Some(seed) = &config.database.seed_file {
                    let count = store.seed_file(seed).await?;
                    info!("Seeded memory store with {} documents from {}", count, seed.display());
                }
                Arc::new(store)
            }
            StorageBackend::Postgres => {
                let pool = DatabaseManager::connect(&config.database).await?;
                let store = PgStore::new(pool, policies.entities())?;
                store.ensure_tables().await?;
                Arc::new(store)
            }
        };

        Ok(Self::new(policies, store))
    }
}

pub fn router(state: AppState, config: &AppConfig) -> Router {
    let mut app = Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Query API
        .route("/api/explain/:entity", get(handlers::entity::explain))
        .route("/api/policies", get(handlers::policy::policy_list))
        .route("/api/policies/:entity", get(handlers::policy::policy_show))
        .route("/api/:entity", get(handlers::entity::list))
        .with_state(state);

    if config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }
    if config.security.enable_cors {
        app = app.layer(cors_layer(&config.security));
    }
    app
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if security.cors_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
