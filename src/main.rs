use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plot_enrichment_api::clients::ClientRegistry;
use plot_enrichment_api::config::Config;
use plot_enrichment_api::db::Database;
use plot_enrichment_api::handlers::{self, AppState};
use plot_enrichment_api::translation_client::TranslationClient;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, the caches and the
/// outbound client registry, then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plot_enrichment_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Reverse-geocode cache (24 hour TTL). Municipalities do not move; the
    // cache also spares Nominatim's 1 req/s policy on repeated lookups.
    let geocode_cache = Cache::builder()
        .time_to_live(Duration::from_secs(86_400))
        .max_capacity(50_000)
        .build();
    tracing::info!("Reverse-geocode cache initialized");

    // Layer query response cache (1 hour TTL). Layer fan-outs are the most
    // expensive calls in the system.
    let layer_cache = Cache::builder()
        .time_to_live(Duration::from_secs(3_600))
        .max_capacity(10_000)
        .build();
    tracing::info!("Layer response cache initialized (1h TTL)");

    // Outbound HTTP client registry, shared by every connector
    let registry = Arc::new(ClientRegistry::new());

    // Initialize translation gateway client, if configured
    let translation_client = match &config.translation_api_url {
        Some(url) => {
            match TranslationClient::new(url.clone(), config.translation_api_key.clone()) {
                Ok(client) => {
                    tracing::info!("✓ Translation gateway client initialized: {}", url);
                    Some(client)
                }
                Err(e) => {
                    tracing::error!("Failed to initialize translation client: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    // Build application state
    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        registry,
        translation_client,
        geocode_cache,
        layer_cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route("/api/v1/enrich", post(handlers::enrich_location))
        .route("/api/v1/layers", post(handlers::query_layers))
        .route("/api/v1/amenities", get(handlers::amenities_lookup))
        .route("/api/v1/cadastre", get(handlers::cadastre_lookup))
        .route(
            "/api/v1/plots/:id/enrichment",
            get(handlers::get_plot_enrichment),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload (polygons can be large,
                // but not that large)
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
