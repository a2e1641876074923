use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pingpague_backend::{
    api,
    config::Config,
    middleware::AppState,
    services::{MessagingTransport, WhatsAppService},
    store::{BillingStore, PgStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pingpague_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting PingPague Backend...");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database successfully");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations completed");

    if config.evolution_credentials().is_none() {
        tracing::warn!("Evolution API is not configured, every WhatsApp send will be recorded as failed");
    }

    let store: Arc<dyn BillingStore> = Arc::new(PgStore::new(pool));
    let transport: Arc<dyn MessagingTransport> = Arc::new(WhatsAppService::new(config.clone()));
    let state = AppState::new(store, transport, config.clone());

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = match config.sweep_cron.as_deref() {
        Some(cron) => Some(start_sweep_scheduler(&state, cron).await?),
        None => {
            tracing::info!("SWEEP_CRON not set, overdue sweep runs only via /api/v1/jobs");
            None
        }
    };

    let app = api::app(state);

    let ip = config
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid HOST: {}", config.host))?;
    let addr = SocketAddr::new(ip, config.port);
    tracing::info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn start_sweep_scheduler(state: &AppState, cron: &str) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sweep = state.sweep();
    scheduler
        .add(Job::new_async(cron, move |_uuid, _l| {
            let sweep = sweep.clone();
            Box::pin(async move {
                tracing::info!("Running scheduled overdue sweep");
                if let Err(e) = sweep.run(chrono::Utc::now()).await {
                    tracing::error!(error = %e, "Scheduled overdue sweep failed");
                }
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!(cron = %cron, "Scheduled: overdue sweep");

    Ok(scheduler)
}
