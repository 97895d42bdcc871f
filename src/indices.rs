use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use log::{error, info, warn};
use tokio::time::sleep;

use crate::error::{AppError, Result};
use crate::provider::{ApiFrame, ProClient};
use crate::store::{self, IndexBar};

/// The fixed index universe this tool tracks.
pub const INDICES: &[(&str, &str)] = &[
    ("上证指数", "000001.SH"),
    ("深证成指", "399001.SZ"),
    ("创业板指", "399006.SZ"),
];

const MAX_RETRIES: usize = 3;
const RETRY_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexOutcome {
    Current,
    Updated,
}

/// Trade-history-only sync for market indices. Unlike the per-security
/// engine it retries the provider internally, and an empty fetch counts as
/// "already current" rather than a failure.
pub struct IndexSync {
    client: Arc<ProClient>,
    index_dir: PathBuf,
}

impl IndexSync {
    pub fn new(client: Arc<ProClient>, index_dir: PathBuf) -> Self {
        Self { client, index_dir }
    }

    /// Ensure one index file is current; resolves to a boolean outcome.
    pub async fn sync_index(&self, name: &str, code: &str, start: &str, end: &str) -> bool {
        match self.sync_inner(name, code, start, end).await {
            Ok(IndexOutcome::Current) => {
                info!("{} is already up to date", name);
                true
            }
            Ok(IndexOutcome::Updated) => {
                info!("{} data updated", name);
                true
            }
            Err(err) => {
                error!("{} update failed: {}", name, err);
                false
            }
        }
    }

    async fn sync_inner(
        &self,
        name: &str,
        code: &str,
        start: &str,
        end: &str,
    ) -> Result<IndexOutcome> {
        let end_date = store::parse_trade_date(end)?;
        let file_path = self.index_dir.join(format!("{}_{}.csv", name, code));

        let existing = if file_path.exists() {
            let bars = store::read_index_history(&file_path)?;
            if bars.is_empty() {
                warn!("{} existing file has no rows, redownloading", name);
            }
            bars
        } else {
            info!("{} has no history yet, downloading the full range", name);
            Vec::new()
        };

        let fetch_start = match existing.iter().map(|bar| bar.trade_date).max() {
            Some(last) if last >= end_date => return Ok(IndexOutcome::Current),
            Some(last) => {
                let from = next_day(last);
                info!("{} incremental update: {} - {}", name, from, end);
                from
            }
            None => start.to_string(),
        };

        let mut last_err: Option<AppError> = None;
        for attempt in 1..=MAX_RETRIES {
            info!(
                "[attempt {}/{}] fetching {} ({}) {} - {}",
                attempt, MAX_RETRIES, name, code, fetch_start, end
            );

            match self.refresh_once(code, &fetch_start, end, &existing, &file_path).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    warn!(
                        "{} attempt {}/{} failed: {}, retrying in {}s",
                        name, attempt, MAX_RETRIES, err, RETRY_DELAY_SECS
                    );
                    last_err = Some(err);
                    if attempt < MAX_RETRIES {
                        sleep(std::time::Duration::from_secs(RETRY_DELAY_SECS)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            AppError::message(format!("{} update failed with no attempts made", name))
        }))
    }

    async fn refresh_once(
        &self,
        code: &str,
        fetch_start: &str,
        end: &str,
        existing: &[IndexBar],
        file_path: &std::path::Path,
    ) -> Result<IndexOutcome> {
        let frame = self.client.index_daily(code, fetch_start, end).await?;
        if frame.is_empty() {
            // nothing new is fine for an index (holiday gaps, weekend runs)
            return Ok(IndexOutcome::Current);
        }

        let fetched = index_bars_from_frame(&frame);
        let merged = store::merge_index_bars(existing.to_vec(), fetched);

        std::fs::create_dir_all(&self.index_dir).map_err(AppError::from)?;
        store::write_index_history(file_path, &merged)?;
        Ok(IndexOutcome::Updated)
    }
}

fn next_day(date: NaiveDate) -> String {
    (date + Duration::days(1)).format("%Y%m%d").to_string()
}

/// Convert a provider index frame into bars, dropping malformed rows,
/// sorted ascending by date.
pub fn index_bars_from_frame(frame: &ApiFrame) -> Vec<IndexBar> {
    let mut bars = Vec::with_capacity(frame.len());

    for row in 0..frame.len() {
        let Some(date_field) = frame.str_cell(row, "trade_date") else {
            continue;
        };
        let Ok(trade_date) = store::parse_trade_date(date_field) else {
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close), Some(vol), Some(amount)) = (
            frame.f64_cell(row, "open"),
            frame.f64_cell(row, "high"),
            frame.f64_cell(row, "low"),
            frame.f64_cell(row, "close"),
            frame.f64_cell(row, "vol"),
            frame.f64_cell(row, "amount"),
        ) else {
            continue;
        };

        bars.push(IndexBar {
            trade_date,
            open,
            high,
            low,
            close,
            vol,
            amount,
        });
    }

    bars.sort_by_key(|bar| bar.trade_date);
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn index_universe_is_fixed() {
        assert_eq!(INDICES.len(), 3);
        assert!(INDICES.iter().any(|(_, code)| *code == "000001.SH"));
    }

    #[test]
    fn frame_rows_become_sorted_bars() {
        let frame = ApiFrame::new(
            vec![
                "trade_date".to_string(),
                "open".to_string(),
                "high".to_string(),
                "low".to_string(),
                "close".to_string(),
                "vol".to_string(),
                "amount".to_string(),
            ],
            vec![
                vec![
                    json!("20240105"),
                    json!(2880.0),
                    json!(2910.0),
                    json!(2875.0),
                    json!(2905.0),
                    json!(250_000_000.0),
                    json!(310_000_000.0),
                ],
                vec![
                    json!("20240104"),
                    json!(2890.0),
                    json!(2902.0),
                    json!(2860.0),
                    json!(2881.0),
                    json!(240_000_000.0),
                    json!(300_000_000.0),
                ],
                // malformed row is dropped
                vec![
                    json!("20240106"),
                    json!(null),
                    json!(2910.0),
                    json!(2875.0),
                    json!(2905.0),
                    json!(250_000_000.0),
                    json!(310_000_000.0),
                ],
            ],
        );

        let bars = index_bars_from_frame(&frame);

        assert_eq!(bars.len(), 2);
        assert!(bars[0].trade_date < bars[1].trade_date);
        assert!((bars[1].close - 2905.0).abs() < 1e-9);
    }

    #[test]
    fn next_day_formats_compact() {
        let date = store::parse_trade_date("20231231").unwrap();
        assert_eq!(next_day(date), "20240101");
    }
}
