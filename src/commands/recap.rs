//! Recap command implementation

use anyhow::Result;
use swing_signals::{recap, Config};

pub fn run(config_path: String, top: Option<usize>) -> Result<()> {
    let mut config = Config::load_or_default(&config_path)?;
    if let Some(top) = top {
        config.bot.recap_size = top;
    }

    let report = recap::recap_from_config(&config)?;
    println!("\n{}\n", report);
    Ok(())
}
