use std::path::Path;

use chrono::NaiveDate;

use crate::error::{AppError, Context, Result};
use crate::store::{csv_reader_from_path, csv_writer_with_bom};

pub const TRADE_COLUMNS: &[&str] = &[
    "trade_date",
    "open",
    "high",
    "low",
    "close",
    "pre_close",
    "change",
    "pct_chg",
    "vol",
    "amount",
    "turnover_rate",
];

/// One day of trade history for a security. The derived statistics can be
/// absent in provider data, so they stay optional; OHLC never is.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeBar {
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub pre_close: Option<f64>,
    pub change: Option<f64>,
    pub pct_chg: Option<f64>,
    pub vol: Option<f64>,
    pub amount: Option<f64>,
    pub turnover_rate: Option<f64>,
}

/// Accepts both the provider's compact form and the stored ISO form.
pub fn parse_trade_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.contains('-') {
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .with_context(|| format!("Failed to parse trade date '{}'", trimmed))
            .map_err(AppError::from)
    } else {
        NaiveDate::parse_from_str(trimmed, "%Y%m%d")
            .with_context(|| format!("Failed to parse trade date '{}'", trimmed))
            .map_err(AppError::from)
    }
}

fn parse_required(field: Option<&str>) -> Option<f64> {
    field.and_then(|value| value.trim().parse::<f64>().ok())
}

fn parse_optional(field: Option<&str>) -> Option<f64> {
    field.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            trimmed.parse::<f64>().ok()
        }
    })
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn read_trade_history(path: &Path) -> Result<Vec<TradeBar>> {
    let mut reader = csv_reader_from_path(path)?;
    let mut bars = Vec::new();

    for result in reader.records() {
        let record = result.context("Failed to read trade history record")?;

        let Some(date_field) = record.get(0) else {
            continue;
        };
        let Ok(trade_date) = parse_trade_date(date_field) else {
            continue;
        };
        let Some(open) = parse_required(record.get(1)) else {
            continue;
        };
        let Some(high) = parse_required(record.get(2)) else {
            continue;
        };
        let Some(low) = parse_required(record.get(3)) else {
            continue;
        };
        let Some(close) = parse_required(record.get(4)) else {
            continue;
        };

        bars.push(TradeBar {
            trade_date,
            open,
            high,
            low,
            close,
            pre_close: parse_optional(record.get(5)),
            change: parse_optional(record.get(6)),
            pct_chg: parse_optional(record.get(7)),
            vol: parse_optional(record.get(8)),
            amount: parse_optional(record.get(9)),
            turnover_rate: parse_optional(record.get(10)),
        });
    }

    Ok(bars)
}

/// Replace the trade file wholesale with the given rows.
pub fn write_trade_history(path: &Path, bars: &[TradeBar]) -> Result<()> {
    let mut writer = csv_writer_with_bom(path)?;

    writer.write_record(TRADE_COLUMNS)?;
    for bar in bars {
        writer.write_record(&[
            bar.trade_date.format("%Y-%m-%d").to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            format_optional(bar.pre_close),
            format_optional(bar.change),
            format_optional(bar.pct_chg),
            format_optional(bar.vol),
            format_optional(bar.amount),
            format_optional(bar.turnover_rate),
        ])?;
    }

    writer.flush().context("Failed to flush trade history")?;
    Ok(())
}

/// Merge cached rows with freshly fetched ones: sorted ascending by date,
/// one row per date, the cached row winning on conflict.
pub fn merge_bars(existing: Vec<TradeBar>, fetched: Vec<TradeBar>) -> Vec<TradeBar> {
    let mut merged = existing;
    merged.extend(fetched);
    // stable sort keeps cached rows ahead of fetched ones for equal dates
    merged.sort_by_key(|bar| bar.trade_date);
    merged.dedup_by_key(|bar| bar.trade_date);
    merged
}

pub fn last_trade_date(bars: &[TradeBar]) -> Option<NaiveDate> {
    bars.iter().map(|bar| bar.trade_date).max()
}
