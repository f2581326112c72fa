use dotenvy::dotenv;
use envelope_autopilot::config;
use envelope_autopilot::engine::Autopilot;
use envelope_autopilot::errors::Result;
use envelope_autopilot::ledger::MemoryLedger;
use envelope_autopilot::persistence::FileStorage;
use envelope_autopilot::scheduler;
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file (as early as possible)
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the main application configuration
    let config_path =
        env::var("AUTOPILOT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let app_config = config::load_config(&config_path)?;
    info!("Configuration loaded from {config_path}.");

    // 4. Build the ledger and storage
    let ledger = Arc::new(MemoryLedger::new(
        app_config.seed_envelopes(),
        app_config.seed_unassigned_cash(),
    ));
    let storage = FileStorage::new(app_config.storage_dir.as_str());

    // 5. Bring up the engine from persisted state
    let autopilot = Arc::new(Autopilot::new(
        Arc::clone(&ledger),
        storage,
        app_config.transfer_timeout(),
    ));
    autopilot
        .initialize()
        .await
        .inspect(|()| info!("Engine state loaded."))
        .inspect_err(|e| error!("Failed to load engine state: {e}"))?;

    // 6. Run the background loops until shutdown
    let scheduler_task = tokio::spawn(scheduler::run_scheduler(
        Arc::clone(&autopilot),
        app_config.scheduler_interval(),
    ));
    let autosave_task = tokio::spawn(scheduler::run_autosave(
        Arc::clone(&autopilot),
        app_config.autosave_interval(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    scheduler_task.abort();
    autosave_task.abort();
    autopilot
        .save()
        .await
        .inspect(|()| info!("Final state saved."))
        .inspect_err(|e| error!("Final save failed: {e}"))?;

    Ok(())
}
