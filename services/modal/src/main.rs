use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use common::database::{DatabaseConfig, init_pool};
use modal::{
    channel::DiscordChannel,
    config::ServiceConfig,
    feature_gate::{FeatureGate, GateConfig},
    repositories::{PgSessionStore, SessionStore, run_migrations},
    router::{FlowRegistry, SessionRouter},
    routes,
    state::AppState,
    sweeper::SessionSweeper,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_max_level(Level::INFO)
        .init();

    info!("Starting modal service");

    let config = ServiceConfig::from_env()?;
    let gate = FeatureGate::new(GateConfig::load()?);

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    run_migrations(&pool).await?;

    let store: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
    let channel = Arc::new(DiscordChannel::new(config.channel_config()));

    // Business flows register their handlers here as they move onto the protocol
    let handlers = FlowRegistry::new();

    let router = SessionRouter::new(store.clone(), channel, Arc::new(gate), handlers)
        .with_default_ttl(config.session_ttl_seconds);

    let sweeper = SessionSweeper::new(store.clone(), Duration::seconds(config.sweep_grace_seconds));
    let _scheduler = sweeper.start(&config.sweep_schedule).await?;

    let app_state = AppState {
        db_pool: Some(pool),
        store,
        router,
    };

    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Modal service listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
