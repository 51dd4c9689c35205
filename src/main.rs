use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use lumen::config::Config;
use lumen::{AppState, handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::patterns::analyze_patterns,
        handlers::patterns::engine_metrics,
        handlers::query::generate_query,
        handlers::query::suggest_queries,
        handlers::query::explain_query,
        handlers::visualization::recommend_charts,
        handlers::visualization::optimize_layout,
    ),
    components(schemas(models::HealthResponse)),
    tags(
        (name = "Service", description = "Health and metrics"),
        (name = "Intelligence", description = "Pattern, query and visualization engines"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_tracing(&config);

    tracing::info!("Starting Lumen intelligence service");
    let state = Arc::new(AppState::from_config(config.clone()));

    let app = Router::new()
        .route("/v1/health", get(handlers::health::health_check))
        .route("/v1/metrics", get(handlers::patterns::engine_metrics))
        .route("/v1/analyze_patterns", post(handlers::patterns::analyze_patterns))
        .route("/v1/generate_query", post(handlers::query::generate_query))
        .route("/v1/suggest_queries", post(handlers::query::suggest_queries))
        .route("/v1/explain_query", post(handlers::query::explain_query))
        .route("/v1/recommend_charts", post(handlers::visualization::recommend_charts))
        .route("/v1/optimize_layout", post(handlers::visualization::optimize_layout))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", address);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    match &config.logging.file {
        Some(path) => {
            let directory = std::path::Path::new(path)
                .parent()
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "lumen.log".to_string());
            let appender = tracing_appender::rolling::daily(directory, file_name);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(appender))
                .init();
        },
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        },
    }
}
