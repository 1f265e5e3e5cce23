//! Bot command implementation

use anyhow::{Context, Result};
use swing_signals::{bot, Config};
use tracing::info;

pub fn run(config_path: String) -> Result<()> {
    let config = Config::load_or_default(&config_path)?;
    config.validate()?;

    info!("{}", "=".repeat(60));
    info!("SWING SIGNALS BOT");
    info!("  Scored table: {}", config.data.scored_path);
    info!("  Alert time:   {}", config.bot.alert_time);
    info!("  State db:     {}", config.bot.state_db);
    info!("{}", "=".repeat(60));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(bot::run(config))
}
