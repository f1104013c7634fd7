use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use domain::services::CompilerBackendError;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, templates};
use crate::services::TemplateGenerationService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<TemplateGenerationService>,
}

impl AppState {
    pub fn new(config: Config, service: TemplateGenerationService) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
        }
    }

    /// Builds the generation service described by `config`.
    pub fn from_config(config: Config) -> Result<Self, CompilerBackendError> {
        let service = TemplateGenerationService::from_config(&config)?;
        Ok(Self::new(config, service))
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    // Empty origin list allows any origin
    let cors = if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let template_routes = Router::new()
        .route("/api/v1/templates/generate", post(templates::generate_template))
        .route("/api/v1/templates/batch", post(templates::generate_batch))
        .route(
            "/api/v1/templates/compatibility-report",
            post(templates::compatibility_report),
        )
        .route("/api/v1/templates/optimize", post(templates::optimize_html))
        .route("/api/v1/templates/validate", post(templates::validate_template))
        .route("/api/v1/templates/cache/stats", get(templates::cache_stats))
        .route("/api/v1/templates/cache/sweep", post(templates::sweep_cache));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(template_routes)
        // Bottom layers run first
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
