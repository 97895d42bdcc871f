use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::{error, info};

use ashare_archiver::batch::{download_all_indices, download_all_stocks};
use ashare_archiver::cli::{Cli, Commands};
use ashare_archiver::config::{Config, HISTORY_FLOOR};
use ashare_archiver::provider::ProClient;
use ashare_archiver::reference::ReferenceTable;
use ashare_archiver::store::parse_trade_date;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::from_env();

    let start = cli
        .start
        .clone()
        .unwrap_or_else(|| HISTORY_FLOOR.to_string());
    let end = cli
        .end
        .clone()
        .unwrap_or_else(|| Local::now().format("%Y%m%d").to_string());
    parse_trade_date(&start).context("invalid --start date")?;
    parse_trade_date(&end).context("invalid --end date")?;

    match cli.command {
        Commands::Stocks {
            output_dir,
            workers,
            max_passes,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(workers) = workers {
                config.max_workers = workers.max(1);
            }
            if let Some(passes) = max_passes {
                config.max_passes = passes.max(1);
            }
            config.require_token()?;

            let client = Arc::new(ProClient::new(&config.token)?);
            let reference = Arc::new(ReferenceTable::load(&client).await?);
            info!("loaded reference data for {} securities", reference.len());

            let report = download_all_stocks(&config, client, reference, &start, &end).await?;
            if !report.all_succeeded() {
                error!(
                    "{} securities failed after {} passes; codes saved to {}",
                    report.failed.len(),
                    report.passes,
                    config.failed_file.display()
                );
                process::exit(1);
            }
        }
        Commands::Indices { output_dir } => {
            if let Some(dir) = output_dir {
                config.index_dir = dir;
            }
            config.require_token()?;

            let client = Arc::new(ProClient::new(&config.token)?);
            let results = download_all_indices(&config, client, &start, &end).await?;
            if results.iter().any(|(_, ok)| !ok) {
                process::exit(1);
            }
        }
    }

    Ok(())
}
