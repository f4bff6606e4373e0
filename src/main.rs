use anyhow::{Context, Result};
use carsale_harvester::{config::Settings, logging, runner};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new().context("Failed to load configuration")?;
    logging::init(&settings.log_file)?;

    tracing::info!(root_url = %settings.root_url, "Starting car listings harvest");

    match runner::run(&settings).await {
        Ok(summary) => {
            tracing::info!(brands = summary.len(), "Harvest complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest aborted: {:#}", e);
            Err(e)
        }
    }
}
