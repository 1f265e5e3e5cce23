//! Scan command implementation

use anyhow::Result;
use swing_signals::{scanner, Config, ScanOutcome};
use tracing::info;

pub fn run(config_path: String, input: Option<String>, json: bool) -> Result<()> {
    let mut config = Config::load_or_default(&config_path)?;
    if let Some(input) = input {
        config.data.scored_path = input;
    }
    config.validate()?;

    let outcome = scanner::scan_from_config(&config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("\n{}\n", outcome);
    }

    match &outcome {
        ScanOutcome::NoTrade => info!("Scan finished: no trade"),
        ScanOutcome::Plan(plan) => info!("Scan finished: {} {}", plan.direction, plan.ticker),
    }
    Ok(())
}
