pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;

use axum::{extract::State, http::HeaderValue, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use services::{
    auth::TokenIssuer,
    mailer::{LogMailer, Mailer},
};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub tokens: TokenIssuer,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;
        info!("Database connected");

        db.run_migrations().await?;

        // Redis опционален: без него кеш и отзыв токенов отключены
        let redis = match &config.redis.url {
            Some(url) => match redis_client::RedisClient::connect(url).await {
                Ok(redis) => {
                    info!("Redis connected");
                    Some(redis)
                }
                Err(e) => {
                    warn!("Redis unavailable, continuing without cache: {:?}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Arc::new(Self::from_parts(
            db,
            cache::CacheService::new(redis),
            config,
            Arc::new(LogMailer),
        )))
    }

    pub fn from_parts(
        db: database::Database,
        cache: cache::CacheService,
        config: config::Config,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            tokens: TokenIssuer::new(&config.auth),
            db,
            cache,
            config,
            mailer,
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "cache": if state.cache.is_enabled() { "enabled" } else { "disabled" },
    }))
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Собирает роутер со всеми маршрутами и слоями.
pub fn app(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/", get(|| async { "Box Office API v1.0" }))
        .route("/health", get(health))
        .merge(controllers::routes())
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    match cors_layer(&state.config.app.cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}
