use std::path::Path;

use chrono::NaiveDate;

use crate::error::{Context, Result};
use crate::store::trade_history::parse_trade_date;
use crate::store::{csv_reader_from_path, csv_writer_with_bom};

pub const INDEX_COLUMNS: &[&str] =
    &["trade_date", "open", "high", "low", "close", "vol", "amount"];

/// One day of trade history for a market index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBar {
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub vol: f64,
    pub amount: f64,
}

pub fn read_index_history(path: &Path) -> Result<Vec<IndexBar>> {
    let mut reader = csv_reader_from_path(path)?;
    let mut bars = Vec::new();

    for result in reader.records() {
        let record = result.context("Failed to read index history record")?;

        let Some(date_field) = record.get(0) else {
            continue;
        };
        let Ok(trade_date) = parse_trade_date(date_field) else {
            continue;
        };

        let parse = |idx: usize| -> Option<f64> {
            record.get(idx).and_then(|field| field.trim().parse().ok())
        };

        let (Some(open), Some(high), Some(low), Some(close), Some(vol), Some(amount)) =
            (parse(1), parse(2), parse(3), parse(4), parse(5), parse(6))
        else {
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

    Ok(bars)
}

pub fn write_index_history(path: &Path, bars: &[IndexBar]) -> Result<()> {
    let mut writer = csv_writer_with_bom(path)?;

    writer.write_record(INDEX_COLUMNS)?;
    for bar in bars {
        writer.write_record(&[
            bar.trade_date.format("%Y-%m-%d").to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.vol.to_string(),
            bar.amount.to_string(),
        ])?;
    }

    writer.flush().context("Failed to flush index history")?;
    Ok(())
}

/// Same merge contract as equities: ascending, one row per date, cached wins.
pub fn merge_index_bars(existing: Vec<IndexBar>, fetched: Vec<IndexBar>) -> Vec<IndexBar> {
    let mut merged = existing;
    merged.extend(fetched);
    merged.sort_by_key(|bar| bar.trade_date);
    merged.dedup_by_key(|bar| bar.trade_date);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> IndexBar {
        IndexBar {
            trade_date: parse_trade_date(date).unwrap(),
            open: close - 5.0,
            high: close + 10.0,
            low: close - 12.0,
            close,
            vol: 1_000_000.0,
            amount: 9_999_999.0,
        }
    }

    #[test]
    fn round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.csv");
        let bars = vec![bar("20240102", 2900.0), bar("20240103", 2912.5)];

        write_index_history(&path, &bars).unwrap();
        let loaded = read_index_history(&path).unwrap();

        assert_eq!(loaded, bars);
    }

    #[test]
    fn merge_keeps_one_row_per_date() {
        let existing = vec![bar("20240102", 2900.0)];
        let fetched = vec![bar("20240102", 1.0), bar("20240103", 2912.5)];

        let merged = merge_index_bars(existing, fetched);

        assert_eq!(merged.len(), 2);
        assert!((merged[0].close - 2900.0).abs() < 1e-9);
    }
}
