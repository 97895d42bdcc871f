use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use tokio::time::sleep;

use crate::config::Config;
use crate::error::{Context, Result};
use crate::indices::{IndexSync, INDICES};
use crate::provider::ProClient;
use crate::reference::ReferenceTable;
use crate::sync::SecuritySync;

/// Pause between retry passes, matching the provider-courtesy delays used
/// elsewhere.
pub const PASS_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_workers: usize,
    /// Hard ceiling on retry passes so a run always terminates.
    pub max_passes: usize,
    pub pass_delay: Duration,
    pub failed_file: PathBuf,
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.max_workers,
            max_passes: config.max_passes,
            pass_delay: Duration::from_secs(PASS_DELAY_SECS),
            failed_file: config.failed_file.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub passes: usize,
    /// Codes still failing when the run ended; empty on full success.
    pub failed: Vec<String>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drive `sync_one` over the code list with bounded concurrency, retrying
/// only the failed subset each pass. The failure list file is overwritten
/// every failing pass, preserving input order.
pub async fn run_passes<F, Fut>(
    codes: Vec<String>,
    options: &BatchOptions,
    sync_one: F,
) -> Result<BatchReport>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = bool>,
{
    let max_workers = options.max_workers.max(1);
    let max_passes = options.max_passes.max(1);

    let mut pending = codes;
    let mut passes = 0;

    while !pending.is_empty() && passes < max_passes {
        passes += 1;
        info!("pass {}: processing {} securities", passes, pending.len());

        let results: Vec<(String, bool)> = stream::iter(pending.clone())
            .map(|code| {
                let task = sync_one(code.clone());
                async move { (code, task.await) }
            })
            .buffered(max_workers)
            .collect()
            .await;

        let failed: Vec<String> = results
            .into_iter()
            .filter(|(_, ok)| !*ok)
            .map(|(code, _)| code)
            .collect();

        if failed.is_empty() {
            info!("all securities downloaded successfully");
            return Ok(BatchReport {
                passes,
                failed: Vec::new(),
            });
        }

        write_failed_list(&options.failed_file, &failed)?;
        warn!(
            "{} securities failed this pass, retrying after {:?}",
            failed.len(),
            options.pass_delay
        );
        pending = failed;
        if passes < max_passes {
            sleep(options.pass_delay).await;
        }
    }

    if !pending.is_empty() {
        error!(
            "{} securities still failing after {} passes",
            pending.len(),
            passes
        );
    }

    Ok(BatchReport {
        passes,
        failed: pending,
    })
}

fn write_failed_list(path: &Path, codes: &[String]) -> Result<()> {
    let mut body = codes.join("\n");
    body.push('\n');
    fs::write(path, body)
        .with_context(|| format!("Failed to write failure list {}", path.display()))?;
    Ok(())
}

/// Full-universe download driver: every code in the reference table, with
/// batch-level retries.
pub async fn download_all_stocks(
    config: &Config,
    client: Arc<ProClient>,
    reference: Arc<ReferenceTable>,
    start: &str,
    end: &str,
) -> Result<BatchReport> {
    let codes = reference.codes();
    info!(
        "starting download of {} securities, range {} - {}",
        codes.len(),
        start,
        end
    );

    let engine = Arc::new(SecuritySync::new(
        client,
        reference,
        config.output_dir.clone(),
    ));
    let options = BatchOptions::from_config(config);
    let start = start.to_string();
    let end = end.to_string();

    run_passes(codes, &options, move |code| {
        let engine = Arc::clone(&engine);
        let start = start.clone();
        let end = end.clone();
        async move { engine.sync_security(&code, &start, &end).await }
    })
    .await
}

/// Full-index download driver; the index set is small and runs sequentially.
pub async fn download_all_indices(
    config: &Config,
    client: Arc<ProClient>,
    start: &str,
    end: &str,
) -> Result<Vec<(String, bool)>> {
    info!("fetching all index data, range {} - {}", start, end);

    let engine = IndexSync::new(client, config.index_dir.clone());
    let mut results = Vec::with_capacity(INDICES.len());
    for (name, code) in INDICES {
        let ok = engine.sync_index(name, code, start, end).await;
        results.push(((*name).to_string(), ok));
    }

    info!("index download pass complete");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn options(dir: &tempfile::TempDir, max_passes: usize) -> BatchOptions {
        BatchOptions {
            max_workers: 2,
            max_passes,
            pass_delay: Duration::ZERO,
            failed_file: dir.path().join("failed_stocks.txt"),
        }
    }

    #[tokio::test]
    async fn converges_once_failures_clear() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(&dir, 10);
        let attempts: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));

        let codes = vec!["000001.SZ".to_string(), "000002.SZ".to_string()];
        let counter = Arc::clone(&attempts);
        let report = run_passes(codes, &opts, move |code| {
            let counter = Arc::clone(&counter);
            async move {
                let mut map = counter.lock().unwrap();
                let seen = map.entry(code.clone()).or_insert(0);
                *seen += 1;
                // the second security needs one retry pass
                code != "000002.SZ" || *seen > 1
            }
        })
        .await
        .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.passes, 2);
        assert_eq!(attempts.lock().unwrap()["000001.SZ"], 1);
        assert_eq!(attempts.lock().unwrap()["000002.SZ"], 2);

        // the failure list from the first pass is left on disk
        let body = fs::read_to_string(&opts.failed_file).unwrap();
        assert_eq!(body, "000002.SZ\n");
    }

    #[tokio::test]
    async fn stops_at_the_pass_limit() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(&dir, 3);

        let report = run_passes(vec!["600000.SH".to_string()], &opts, |_code| async {
            false
        })
        .await
        .unwrap();

        assert_eq!(report.passes, 3);
        assert_eq!(report.failed, vec!["600000.SH".to_string()]);
    }

    #[tokio::test]
    async fn failure_list_preserves_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(&dir, 1);

        let codes = vec![
            "600000.SH".to_string(),
            "000001.SZ".to_string(),
            "300001.SZ".to_string(),
        ];
        let report = run_passes(codes, &opts, |code| async move {
            code == "000001.SZ"
        })
        .await
        .unwrap();

        assert_eq!(
            report.failed,
            vec!["600000.SH".to_string(), "300001.SZ".to_string()]
        );
        let body = fs::read_to_string(&opts.failed_file).unwrap();
        assert_eq!(body, "600000.SH\n300001.SZ\n");
    }

    #[tokio::test]
    async fn empty_universe_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(&dir, 5);

        let report = run_passes(Vec::new(), &opts, |_code| async { true })
            .await
            .unwrap();

        assert_eq!(report.passes, 0);
        assert!(report.all_succeeded());
        assert!(!opts.failed_file.exists());
    }
}
