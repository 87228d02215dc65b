use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use leadpipe_core::config::{AppConfig, ConfigError, LoadOptions};
use leadpipe_db::repositories::{LeadRepository, SqlCostLedger, SqlLeadRepository};
use leadpipe_db::{connect, migrations, DbPool, DemoDataset};
use leadpipe_notify::PokeClient;
use leadpipe_router::{CostRouter, ForwardClient};

use crate::tools::ToolService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub tools: Arc<ToolService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("demo seed failed: {0}")]
    Seed(String),
    #[error("upstream client initialization failed: {0}")]
    Upstream(String),
    #[error("notifier initialization failed: {0}")]
    Notifier(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let leads = Arc::new(SqlLeadRepository::new(db_pool.clone()));
    let ledger = Arc::new(SqlCostLedger::new(db_pool.clone()));

    if config.server.seed_demo_data {
        seed_if_empty(&db_pool, leads.as_ref()).await?;
    }

    let forward_client = ForwardClient::new(&config.upstream)
        .map_err(|error| BootstrapError::Upstream(error.to_string()))?;
    let router = CostRouter::new(Arc::new(forward_client), config.routing.clone());

    let notifier = PokeClient::new(&config.poke)
        .map_err(|error| BootstrapError::Notifier(error.to_string()))?;

    let tools = Arc::new(ToolService::new(leads, ledger, router, Arc::new(notifier)));

    Ok(Application { config, db_pool, tools })
}

/// Flag-gated convenience for throwaway deployments: an empty database gets
/// the canonical demo pipeline so the tools have something to show.
async fn seed_if_empty(
    pool: &DbPool,
    leads: &dyn LeadRepository,
) -> Result<(), BootstrapError> {
    let existing = leads.count().await.map_err(|error| BootstrapError::Seed(error.to_string()))?;
    if existing > 0 {
        return Ok(());
    }

    let seeded =
        DemoDataset::load(pool).await.map_err(|error| BootstrapError::Seed(error.to_string()))?;
    info!(
        event_name = "system.bootstrap.demo_seeded",
        leads = seeded.leads_seeded,
        cost_entries = seeded.cost_entries_seeded,
        "seeded empty database with demo pipeline"
    );
    Ok(())
}
