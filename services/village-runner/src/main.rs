//! Village Runner - unattended account manager
//!
//! Runs the engine against the built-in simulated game:
//! 1. Loads configuration (YAML file + environment)
//! 2. Logs in and syncs the account every tick
//! 3. Builds, trains, adventures and raids
//! 4. Stops cleanly on Ctrl-C

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use village_runner::{
    types::Account, BotEngine, Clock, EngineConfig, RateLimitedAdvisor, Reporter, SimulatedGame,
    StopReason, SystemClock,
};

/// Village runner entry point
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting Village Runner...");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref())?;
    let username = std::env::var("VILLAGE_RUNNER_USERNAME").unwrap_or_else(|_| "sim-player".to_string());

    // The game session is not Send; everything runs on this thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match runtime.block_on(run(config, username))? {
        StopReason::Requested => {
            info!("Village Runner stopped");
            Ok(())
        }
        StopReason::LoginFailed => Err(anyhow::anyhow!("Could not establish a game session")),
    }
}

async fn run(config: EngineConfig, username: String) -> anyhow::Result<StopReason> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let game = SimulatedGame::new(config.farming.shuffle_seed);
    let advisor = RateLimitedAdvisor::from_config(&config.advisor, clock.clone(), Reporter::default())?;

    let mut engine = BotEngine::new(game, Account::new(username), config, clock, None);
    match advisor {
        Some(advisor) => engine = engine.with_advisor(Box::new(advisor)),
        None => info!("Target advisor disabled, farm list stays empty"),
    }
    info!("Run id: {}", engine.run_id());

    let handle = engine.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current step");
            handle.stop();
        }
    });

    Ok(engine.run().await)
}
