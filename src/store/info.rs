use std::path::Path;

use crate::error::{Context, Result};
use crate::store::csv_writer_with_bom;

/// Column labels of the single-row info snapshot, in file order.
pub const INFO_COLUMNS: &[&str] = &[
    "公司名称",
    "公司代号",
    "上市地点",
    "主要板块",
    "公司位置",
    "注册资本（万元）",
    "总市值（亿元）",
    "流通市值（亿元）",
    "总资产（亿元）",
    "PE（市盈率）",
    "PB（市净率）",
];

/// Point-in-time company facts, already rendered for the CSV (numeric fields
/// carry the missing-value sentinel when the provider had nothing).
#[derive(Debug, Clone)]
pub struct CompanySnapshot {
    pub name: String,
    pub code: String,
    pub listing_location: String,
    pub industry: String,
    pub location: String,
    pub reg_capital: String,
    pub total_mv: String,
    pub circ_mv: String,
    pub total_assets: String,
    pub pe_ttm: String,
    pub pb: String,
}

impl CompanySnapshot {
    /// Overwrite the info file wholesale; the snapshot is not time-series.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv_writer_with_bom(path)?;

        writer.write_record(INFO_COLUMNS)?;
        writer.write_record(&[
            &self.name,
            &self.code,
            &self.listing_location,
            &self.industry,
            &self.location,
            &self.reg_capital,
            &self.total_mv,
            &self.circ_mv,
            &self.total_assets,
            &self.pe_ttm,
            &self.pb,
        ])?;

        writer.flush().context("Failed to flush info snapshot")?;
        Ok(())
    }
}
