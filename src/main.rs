use axum::routing::get;
use axum::Router;
use clap::Parser;
use meander::analytics::{handler, AnalyticsState};
use meander::config::AppConfig;
use meander::store;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

#[derive(Parser)]
#[command(name = "meander", about = "Self-hosted behavioral analytics service")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meander=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(Some(&cli.config))?;

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        db = %config.database.path.display(),
        "starting meander"
    );

    // Setup SQLite pool against the externally-populated analytics store
    let pool = store::sqlite::create_pool(&config.database)?;
    store::sqlite::init_pool(&pool).await?;
    tracing::info!("database initialized");

    // One explicitly-owned engine state shared by all handlers
    let state = Arc::new(AnalyticsState::new(pool, config.engine.clone()));

    // Rate limiter for the analytics API
    let governor_conf = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(config.rate_limit.per_second)
        .burst_size(config.rate_limit.burst_size)
        .finish()
        .expect("failed to build rate limiter config");

    // Read-only API: any origin, no credentials
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    // ── Health route (public) ──
    let health_route = Router::new()
        .route("/health", get(handler::health))
        .with_state(state.clone());

    // ── Analytics routes (rate-limited) ──
    let analytics_routes = Router::new()
        .route(
            "/v1/analytics/session-duration",
            get(handler::session_duration_analysis).post(handler::custom_session_duration_analysis),
        )
        .route(
            "/v1/analytics/user-journeys",
            get(handler::user_journeys_analysis).post(handler::custom_user_journeys_analysis),
        )
        .route("/v1/analytics/export", get(handler::export_data))
        .layer(GovernorLayer::new(governor_conf))
        .with_state(state.clone());

    // ── Admin routes ──
    let admin_routes = Router::new()
        .route(
            "/v1/admin/config",
            get(handler::get_engine_config).put(handler::update_engine_config),
        )
        .with_state(state.clone());

    let app = Router::new()
        .merge(health_route)
        .merge(analytics_routes)
        .merge(admin_routes)
        .layer(cors);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down...");
}
