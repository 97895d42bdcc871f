use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ashare-archiver")]
#[command(about = "Incrementally download, cache and chart Chinese A-share market data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Range start, YYYYMMDD (defaults to the historical floor)
    #[arg(short, long)]
    pub start: Option<String>,

    /// Range end, YYYYMMDD (defaults to today)
    #[arg(short, long)]
    pub end: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the full security universe with batch-level retries
    Stocks {
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Concurrent sync workers
        #[arg(long)]
        workers: Option<usize>,

        /// Maximum retry passes before giving up
        #[arg(long)]
        max_passes: Option<usize>,
    },

    /// Download the fixed market-index set
    Indices {
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}
