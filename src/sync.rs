use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use log::{error, info};
use tokio::time::sleep;

use crate::chart;
use crate::error::{AppError, Result};
use crate::provider::{ApiFrame, ProClient};
use crate::reference::{listing_location, ReferenceTable, SecurityInfo};
use crate::store::{self, CompanySnapshot, StockPaths, TradeBar};
use crate::utils::{safe_round, sanitize_filename, MISSING};

/// Courtesy pause after every per-security call, success or failure, so the
/// provider's rate limit is respected without a global limiter.
const CALL_DELAY_MS: u64 = 500;

/// What one sync run has to do for a security, decided purely from on-disk
/// state and the requested end date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub need_info: bool,
    pub need_trade: bool,
    pub need_chart: bool,
    /// Max cached trade date, when a usable trade file was read.
    pub last_cached: Option<NaiveDate>,
}

impl SyncPlan {
    /// Staleness policy. One rule is deliberate and load-bearing: whenever an
    /// incremental trade update is due, the metadata snapshot is refreshed as
    /// well, even if info.csv already exists.
    pub fn assess(
        has_info: bool,
        trade_file_usable: bool,
        has_charts: bool,
        last_cached: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Self {
        let mut need_info = !has_info;
        let mut need_trade = !trade_file_usable;
        let need_chart = !has_charts;

        if trade_file_usable {
            match last_cached {
                Some(last) if last >= end => {
                    need_trade = false;
                }
                _ => {
                    // behind the requested end, or a file with no parseable rows
                    need_trade = true;
                    need_info = true;
                }
            }
        }

        Self {
            need_info,
            need_trade,
            need_chart,
            last_cached: if trade_file_usable { last_cached } else { None },
        }
    }

    /// Nothing stale: the run may finish without contacting the provider.
    pub fn is_noop(&self) -> bool {
        !(self.need_info || self.need_trade || self.need_chart)
    }

    /// First date the trade fetch must cover: the listing date for a fresh
    /// cache, otherwise the day after the last cached row.
    pub fn fetch_start(&self, list_date: &str) -> String {
        match self.last_cached {
            Some(last) => (last + Duration::days(1)).format("%Y%m%d").to_string(),
            None => list_date.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Everything was already current; no provider call was made.
    Current,
    Updated,
}

/// Per-security sync engine: probes the artifact set, fetches what is stale,
/// merges, persists, and triggers chart rendering.
pub struct SecuritySync {
    client: Arc<ProClient>,
    reference: Arc<ReferenceTable>,
    output_dir: PathBuf,
}

impl SecuritySync {
    pub fn new(client: Arc<ProClient>, reference: Arc<ReferenceTable>, output_dir: PathBuf) -> Self {
        Self {
            client,
            reference,
            output_dir,
        }
    }

    /// Ensure one security's artifact set is current for the requested range.
    /// Always resolves to a boolean outcome; failures are logged with the
    /// code and never propagate.
    pub async fn sync_security(&self, code: &str, start: &str, end: &str) -> bool {
        let result = self.sync_inner(code, start, end).await;
        sleep(std::time::Duration::from_millis(CALL_DELAY_MS)).await;

        match result {
            Ok(SyncOutcome::Current) => {
                info!("{} already complete, skipped", code);
                true
            }
            Ok(SyncOutcome::Updated) => {
                info!("{} downloaded successfully", code);
                true
            }
            Err(err) => {
                error!("download failed for {}: {}", code, err);
                false
            }
        }
    }

    async fn sync_inner(&self, code: &str, start: &str, end: &str) -> Result<SyncOutcome> {
        let security = self
            .reference
            .get(code)
            .ok_or_else(|| AppError::message(format!("no reference entry for {}", code)))?;

        let name = sanitize_filename(&security.name);
        if name.is_empty() {
            return Err(AppError::message(format!(
                "display name of {} sanitizes to nothing",
                code
            )));
        }

        let start_date = store::parse_trade_date(start)?;
        let end_date = store::parse_trade_date(end)?;

        let paths = StockPaths::new(&self.output_dir, &name, code);
        let trade_usable = paths.trade_file_usable();
        let cached = if trade_usable {
            store::read_trade_history(&paths.trade_file)?
        } else {
            Vec::new()
        };

        let plan = SyncPlan::assess(
            paths.has_info(),
            trade_usable,
            paths.has_charts(),
            store::last_trade_date(&cached),
            end_date,
        );

        if plan.is_noop() {
            return Ok(SyncOutcome::Current);
        }

        paths.ensure_dir()?;

        if plan.need_info {
            self.refresh_info(code, security, &name, &paths).await?;
        }

        let mut bars = cached;
        let mut trade_written = false;
        if plan.need_trade {
            let fetch_start = plan.fetch_start(&security.list_date);
            if fetch_start.is_empty() {
                return Err(AppError::message(format!(
                    "{} has no listing date to start the fetch from",
                    code
                )));
            }
            // fetch end is always today; the requested end only drives
            // staleness and the chart window
            let today = Local::now().format("%Y%m%d").to_string();

            let frame = self.client.daily(code, &fetch_start, &today).await?;
            if frame.is_empty() {
                return Err(AppError::message(format!(
                    "no trade rows returned for {} since {}",
                    code, fetch_start
                )));
            }

            let fetched = trade_bars_from_frame(&frame);
            bars = store::merge_bars(bars, fetched);
            store::write_trade_history(&paths.trade_file, &bars)?;
            trade_written = true;
            info!("updated trade history for {} ({} rows)", code, bars.len());
        }

        if trade_written || plan.need_chart {
            chart::plot_stock_charts(code, &bars, &paths.dir, start_date, end_date)?;
        }

        Ok(SyncOutcome::Updated)
    }

    /// Rebuild and overwrite the info snapshot. Each provider call must
    /// succeed, but empty result sets degrade to sentinels instead of
    /// failing the security.
    async fn refresh_info(
        &self,
        code: &str,
        security: &SecurityInfo,
        name: &str,
        paths: &StockPaths,
    ) -> Result<()> {
        let company = self.client.stock_company(code).await?;
        let valuation = self.client.daily_basic(code).await?;
        let balance = self.client.balancesheet(code).await?;

        let mut province = MISSING.to_string();
        let mut city = MISSING.to_string();
        let mut reg_capital = MISSING.to_string();
        if !company.is_empty() {
            if let Some(value) = company.display_cell(0, "province") {
                province = value;
            }
            if let Some(value) = company.display_cell(0, "city") {
                city = value;
            }
            if let Some(value) = company.display_cell(0, "reg_capital") {
                reg_capital = value;
            }
        }

        // market caps arrive in 万元 and are published in 亿元
        let (total_mv, circ_mv, pe_ttm, pb) = if valuation.is_empty() {
            (
                MISSING.to_string(),
                MISSING.to_string(),
                MISSING.to_string(),
                MISSING.to_string(),
            )
        } else {
            (
                safe_round(valuation.f64_cell(0, "total_mv").map(|v| v / 1e4), 2),
                safe_round(valuation.f64_cell(0, "circ_mv").map(|v| v / 1e4), 2),
                safe_round(valuation.f64_cell(0, "pe_ttm"), 2),
                safe_round(valuation.f64_cell(0, "pb"), 2),
            )
        };

        let total_assets = if balance.is_empty() {
            MISSING.to_string()
        } else {
            safe_round(balance.f64_cell(0, "total_assets").map(|v| v / 1e4), 2)
        };

        let snapshot = CompanySnapshot {
            name: name.to_string(),
            code: code.to_string(),
            listing_location: listing_location(&security.market).to_string(),
            industry: security.industry.clone(),
            location: format!("{} {}", province, city),
            reg_capital,
            total_mv,
            circ_mv,
            total_assets,
            pe_ttm,
            pb,
        };
        snapshot.write(&paths.info_file)?;
        info!("updated info.csv for {}", code);

        Ok(())
    }
}

/// Convert a provider daily frame into trade bars, dropping malformed rows,
/// sorted ascending by date.
pub fn trade_bars_from_frame(frame: &ApiFrame) -> Vec<TradeBar> {
    let mut bars = Vec::with_capacity(frame.len());

    for row in 0..frame.len() {
        let Some(date_field) = frame.str_cell(row, "trade_date") else {
            continue;
        };
        let Ok(trade_date) = store::parse_trade_date(date_field) else {
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close)) = (
            frame.f64_cell(row, "open"),
            frame.f64_cell(row, "high"),
            frame.f64_cell(row, "low"),
            frame.f64_cell(row, "close"),
        ) else {
            continue;
        };

        bars.push(TradeBar {
            trade_date,
            open,
            high,
            low,
            close,
            pre_close: frame.f64_cell(row, "pre_close"),
            change: frame.f64_cell(row, "change"),
            pct_chg: frame.f64_cell(row, "pct_chg"),
            vol: frame.f64_cell(row, "vol"),
            amount: frame.f64_cell(row, "amount"),
            turnover_rate: frame.f64_cell(row, "turnover_rate"),
        });
    }

    bars.sort_by_key(|bar| bar.trade_date);
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(raw: &str) -> NaiveDate {
        store::parse_trade_date(raw).unwrap()
    }

    #[test]
    fn fresh_security_needs_everything() {
        let plan = SyncPlan::assess(false, false, false, None, date("20240110"));

        assert!(plan.need_info);
        assert!(plan.need_trade);
        assert!(plan.need_chart);
        assert!(!plan.is_noop());
        assert_eq!(plan.fetch_start("20100101"), "20100101");
    }

    #[test]
    fn fully_cached_security_is_a_noop() {
        let plan = SyncPlan::assess(
            true,
            true,
            true,
            Some(date("20240110")),
            date("20240110"),
        );

        assert!(plan.is_noop());
    }

    #[test]
    fn stale_trade_data_forces_metadata_refresh() {
        // info.csv exists, yet the pending incremental update drags it along
        let plan = SyncPlan::assess(
            true,
            true,
            true,
            Some(date("20240105")),
            date("20240110"),
        );

        assert!(plan.need_trade);
        assert!(plan.need_info);
        assert!(!plan.need_chart);
        assert_eq!(plan.fetch_start("20100101"), "20240106");
    }

    #[test]
    fn covered_range_skips_trade_but_not_missing_info() {
        let plan = SyncPlan::assess(
            false,
            true,
            true,
            Some(date("20240110")),
            date("20240108"),
        );

        assert!(!plan.need_trade);
        assert!(plan.need_info);
        assert!(!plan.is_noop());
    }

    #[test]
    fn missing_charts_alone_trigger_a_render_pass() {
        let plan = SyncPlan::assess(
            true,
            true,
            false,
            Some(date("20240110")),
            date("20240110"),
        );

        assert!(plan.need_chart);
        assert!(!plan.need_trade);
        assert!(!plan.need_info);
    }

    #[test]
    fn usable_file_without_rows_refetches_from_listing_date() {
        let plan = SyncPlan::assess(true, true, true, None, date("20240110"));

        assert!(plan.need_trade);
        assert!(plan.need_info);
        assert_eq!(plan.fetch_start("20100101"), "20100101");
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
                "pre_close".to_string(),
                "change".to_string(),
                "pct_chg".to_string(),
                "vol".to_string(),
                "amount".to_string(),
                "turnover_rate".to_string(),
            ],
            vec![
                vec![
                    json!("20240105"),
                    json!(10.8),
                    json!(11.0),
                    json!(10.6),
                    json!(10.9),
                    json!(10.7),
                    json!(0.2),
                    json!(1.87),
                    json!(80_000.0),
                    json!(870_000.0),
                    json!(null),
                ],
                vec![
                    json!("20240104"),
                    json!(10.5),
                    json!(10.9),
                    json!(10.4),
                    json!(10.7),
                    json!(null),
                    json!(null),
                    json!(null),
                    json!(75_000.0),
                    json!(800_000.0),
                    json!(1.2),
                ],
            ],
        );

        let bars = trade_bars_from_frame(&frame);

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].trade_date, date("20240104"));
        assert_eq!(bars[0].pre_close, None);
        assert_eq!(bars[1].turnover_rate, None);
        assert!((bars[1].close - 10.9).abs() < 1e-9);
    }
}
