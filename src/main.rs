use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use liftcoach::clock::SystemClock;
use liftcoach::config::Config;
use liftcoach::generation::{create_model_client, SessionGenerator};
use liftcoach::handlers::{analytics, profile, sessions};
use liftcoach::repositories::{ProfileRepository, SessionRepository};
use liftcoach::runner::TokioTimerService;
use liftcoach::{db, migrations, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "liftcoach=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Connecting to database: {}", config.database_url);

    // Create database pool
    let pool = db::create_pool(&config.database_url)?;

    // Run migrations
    migrations::run_migrations(&pool)?;

    // Model client and generation pipeline
    let model = create_model_client(&config.ai)?;
    let generator = Arc::new(SessionGenerator::from_config(model, &config.ai));
    tracing::info!(
        model = %config.ai.model,
        max_retries = config.ai.max_retries,
        "Session generator ready"
    );

    // Create repositories
    let session_repo = SessionRepository::new(pool.clone());
    let profile_repo = ProfileRepository::new(pool.clone());
    let clock = Arc::new(SystemClock);

    // Create handler states
    let sessions_state = sessions::SessionsState {
        session_repo: session_repo.clone(),
        profile_repo: profile_repo.clone(),
        generator,
        runners: sessions::RunnerRegistry::new(),
        timers: Arc::new(TokioTimerService),
        clock: clock.clone(),
    };
    let analytics_state = analytics::AnalyticsState {
        session_repo: session_repo.clone(),
        clock,
    };
    let profile_state = profile::ProfileState { profile_repo };

    // Build router
    let app = routes::create_router(sessions_state, analytics_state, profile_state);

    // Start server
    let addr = config.server_addr();
    tracing::info!("Starting server at http://{}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
