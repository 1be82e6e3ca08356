use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sawmill_scheduler::config::AppConfig;
use sawmill_scheduler::db;
use sawmill_scheduler::handlers;
use sawmill_scheduler::services::calendar::SystemClock;
use sawmill_scheduler::services::scheduling::Scheduler;
use sawmill_scheduler::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    if config.admin_token == "changeme" {
        tracing::warn!("ADMIN_TOKEN is the default; set it before exposing the service");
    }

    let calendar = config.calendar_policy()?;
    let pool = db::init_pool(&config.database_url, &config.pool_options())?;

    tracing::info!(
        open = %config.open_time,
        close = %config.close_time,
        granularity = calendar.slot_granularity_minutes(),
        default_duration = calendar.default_duration_minutes(),
        "calendar policy loaded"
    );

    let scheduler = Scheduler::new(calendar, Arc::new(SystemClock), config.retry_policy());
    let state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        scheduler,
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
