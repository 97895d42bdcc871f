use std::env;
use std::path::PathBuf;

use crate::error::{AppError, Result};

/// Earliest date requested when no explicit start is given.
pub const HISTORY_FLOOR: &str = "20000101";

const DEFAULT_OUTPUT_DIR: &str = "stock_data";
const DEFAULT_INDEX_DIR: &str = "index_data";
const DEFAULT_FAILED_FILE: &str = "failed_stocks.txt";
const DEFAULT_MAX_WORKERS: usize = 5;
const DEFAULT_MAX_PASSES: usize = 20;

#[derive(Debug, Clone)]
pub struct Config {
    /// Provider API token; required before any network call.
    pub token: String,
    pub output_dir: PathBuf,
    pub index_dir: PathBuf,
    pub failed_file: PathBuf,
    pub max_workers: usize,
    /// Upper bound on batch retry passes so a run always terminates.
    pub max_passes: usize,
}

impl Config {
    pub fn builtin() -> Self {
        Self {
            token: String::new(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            failed_file: PathBuf::from(DEFAULT_FAILED_FILE),
            max_workers: DEFAULT_MAX_WORKERS,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Builtin defaults overridden by environment variables where set.
    pub fn from_env() -> Self {
        let mut config = Self::builtin();

        if let Ok(token) = env::var("TUSHARE_TOKEN") {
            config.token = token.trim().to_string();
        }
        if let Ok(dir) = env::var("ASHARE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("ASHARE_INDEX_DIR") {
            config.index_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var("ASHARE_FAILED_FILE") {
            config.failed_file = PathBuf::from(file);
        }
        if let Ok(workers) = env::var("ASHARE_MAX_WORKERS") {
            if let Ok(parsed) = workers.trim().parse::<usize>() {
                config.max_workers = parsed.max(1);
            }
        }
        if let Ok(passes) = env::var("ASHARE_MAX_PASSES") {
            if let Ok(parsed) = passes.trim().parse::<usize>() {
                config.max_passes = parsed.max(1);
            }
        }

        config
    }

    pub fn require_token(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(AppError::message(
                "provider token is not configured; set TUSHARE_TOKEN",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_defaults_are_sane() {
        let config = Config::builtin();
        assert_eq!(config.output_dir, PathBuf::from("stock_data"));
        assert_eq!(config.index_dir, PathBuf::from("index_data"));
        assert!(config.max_workers >= 1);
        assert!(config.max_passes >= 1);
    }

    #[test]
    fn empty_token_is_rejected() {
        let config = Config::builtin();
        assert!(config.require_token().is_err());

        let mut config = Config::builtin();
        config.token = "secret".to_string();
        assert!(config.require_token().is_ok());
    }
}
