use std::collections::HashMap;

use crate::error::Result;
use crate::provider::{ApiFrame, ProClient};
use crate::utils::MISSING;

/// Static reference facts for one security, keyed by its provider code.
#[derive(Debug, Clone)]
pub struct SecurityInfo {
    pub name: String,
    /// Listing date in `YYYYMMDD` form, as the provider reports it.
    pub list_date: String,
    pub market: String,
    pub industry: String,
}

/// Read-only security lookup table, built once per run and shared by the
/// sync engines.
pub struct ReferenceTable {
    securities: HashMap<String, SecurityInfo>,
}

impl ReferenceTable {
    pub async fn load(client: &ProClient) -> Result<Self> {
        let frame = client.stock_basic().await?;
        Ok(Self::from_frame(&frame))
    }

    pub fn from_frame(frame: &ApiFrame) -> Self {
        let mut securities = HashMap::with_capacity(frame.len());

        for row in 0..frame.len() {
            let Some(ts_code) = frame.str_cell(row, "ts_code") else {
                continue;
            };
            let Some(name) = frame.str_cell(row, "name") else {
                continue;
            };

            securities.insert(
                ts_code.to_string(),
                SecurityInfo {
                    name: name.to_string(),
                    list_date: frame.str_cell(row, "list_date").unwrap_or_default().to_string(),
                    market: frame.str_cell(row, "market").unwrap_or_default().to_string(),
                    industry: frame
                        .str_cell(row, "industry")
                        .unwrap_or(MISSING)
                        .to_string(),
                },
            );
        }

        Self { securities }
    }

    pub fn get(&self, code: &str) -> Option<&SecurityInfo> {
        self.securities.get(code)
    }

    /// All known codes, sorted for deterministic batch ordering.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.securities.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }
}

/// Map a market segment to the city the security is listed in. Unrecognized
/// segments map to the explicit unknown sentinel.
pub fn listing_location(market: &str) -> &'static str {
    match market {
        "主板" | "科创板" => "上海",
        "创业板" | "中小企业板" => "深圳",
        "北交所" => "北京",
        _ => "未知",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_frame() -> ApiFrame {
        ApiFrame::new(
            vec![
                "ts_code".to_string(),
                "name".to_string(),
                "list_date".to_string(),
                "market".to_string(),
                "industry".to_string(),
            ],
            vec![
                vec![
                    json!("000001.SZ"),
                    json!("平安银行"),
                    json!("19910403"),
                    json!("主板"),
                    json!("银行"),
                ],
                vec![
                    json!("688001.SH"),
                    json!("华兴源创"),
                    json!("20190722"),
                    json!("科创板"),
                    json!(null),
                ],
            ],
        )
    }

    #[test]
    fn builds_lookup_from_frame() {
        let table = ReferenceTable::from_frame(&sample_frame());

        assert_eq!(table.len(), 2);
        let info = table.get("000001.SZ").unwrap();
        assert_eq!(info.name, "平安银行");
        assert_eq!(info.list_date, "19910403");
        assert_eq!(info.market, "主板");
        assert!(table.get("600000.SH").is_none());
    }

    #[test]
    fn missing_industry_becomes_sentinel() {
        let table = ReferenceTable::from_frame(&sample_frame());
        assert_eq!(table.get("688001.SH").unwrap().industry, MISSING);
    }

    #[test]
    fn codes_are_sorted() {
        let table = ReferenceTable::from_frame(&sample_frame());
        assert_eq!(table.codes(), vec!["000001.SZ", "688001.SH"]);
    }

    #[test]
    fn maps_market_segments_to_listing_cities() {
        assert_eq!(listing_location("主板"), "上海");
        assert_eq!(listing_location("科创板"), "上海");
        assert_eq!(listing_location("创业板"), "深圳");
        assert_eq!(listing_location("中小企业板"), "深圳");
        assert_eq!(listing_location("北交所"), "北京");
        assert_eq!(listing_location("新三板"), "未知");
    }
}
