use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Context, Result};

pub mod index_history;
pub mod info;
pub mod trade_history;

pub use index_history::{
    merge_index_bars, read_index_history, write_index_history, IndexBar,
};
pub use info::CompanySnapshot;
pub use trade_history::{
    last_trade_date, merge_bars, parse_trade_date, read_trade_history, write_trade_history,
    TradeBar,
};

pub const INFO_FILE: &str = "info.csv";
pub const KLINE_CHART_FILE: &str = "draw_trade_data.png";
pub const VOLUME_CHART_FILE: &str = "draw_trade_vol.png";

/// The artifact set of one security: its directory plus the fixed filenames
/// inside it. Existence of these files is the authoritative sync state.
#[derive(Debug, Clone)]
pub struct StockPaths {
    pub dir: PathBuf,
    pub info_file: PathBuf,
    pub trade_file: PathBuf,
    pub kline_chart: PathBuf,
    pub volume_chart: PathBuf,
}

impl StockPaths {
    pub fn new(output_root: &Path, sanitized_name: &str, code: &str) -> Self {
        let slug = format!("{}_{}", sanitized_name, code.replace('.', "_"));
        let dir = output_root.join(&slug);
        Self {
            info_file: dir.join(INFO_FILE),
            trade_file: dir.join(format!("{}.csv", slug)),
            kline_chart: dir.join(KLINE_CHART_FILE),
            volume_chart: dir.join(VOLUME_CHART_FILE),
            dir,
        }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory {}", self.dir.display()))?;
        Ok(())
    }

    pub fn has_info(&self) -> bool {
        self.info_file.exists()
    }

    /// A zero-byte trade file counts as missing.
    pub fn trade_file_usable(&self) -> bool {
        fs::metadata(&self.trade_file)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
    }

    pub fn has_charts(&self) -> bool {
        self.kline_chart.exists() && self.volume_chart.exists()
    }
}

/// CSV writer that prefixes the file with a UTF-8 BOM so spreadsheet tools
/// read the CJK headers correctly.
pub(crate) fn csv_writer_with_bom(path: &Path) -> Result<csv::Writer<fs::File>> {
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all("\u{feff}".as_bytes())
        .with_context(|| format!("Failed to write BOM to {}", path.display()))?;
    Ok(csv::Writer::from_writer(file))
}

/// Read a CSV file into records, tolerating an optional leading BOM.
pub(crate) fn csv_reader_from_path(path: &Path) -> Result<csv::Reader<std::io::Cursor<String>>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let body = raw.trim_start_matches('\u{feff}').to_string();
    Ok(csv::Reader::from_reader(std::io::Cursor::new(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_artifact_paths_from_name_and_code() {
        let paths = StockPaths::new(Path::new("stock_data"), "平安银行", "000001.SZ");

        assert_eq!(
            paths.dir,
            Path::new("stock_data").join("平安银行_000001_SZ")
        );
        assert_eq!(paths.info_file, paths.dir.join("info.csv"));
        assert_eq!(
            paths.trade_file,
            paths.dir.join("平安银行_000001_SZ.csv")
        );
        assert_eq!(paths.kline_chart, paths.dir.join("draw_trade_data.png"));
        assert_eq!(paths.volume_chart, paths.dir.join("draw_trade_vol.png"));
    }

    #[test]
    fn zero_byte_trade_file_is_unusable() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StockPaths::new(dir.path(), "测试", "000002.SZ");
        paths.ensure_dir().unwrap();

        assert!(!paths.trade_file_usable());
        fs::write(&paths.trade_file, b"").unwrap();
        assert!(!paths.trade_file_usable());
        fs::write(&paths.trade_file, b"trade_date\n").unwrap();
        assert!(paths.trade_file_usable());
    }
}
