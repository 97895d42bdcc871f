use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Context, Result};

const PRO_ENDPOINT: &str = "http://api.tushare.pro";
const REQUEST_TIMEOUT_SECS: u64 = 30;

const DAILY_FIELDS: &str =
    "trade_date,open,high,low,close,pre_close,change,pct_chg,vol,amount,turnover_rate";
const INDEX_DAILY_FIELDS: &str = "trade_date,open,high,low,close,vol,amount";

/// Client for the provider's single-endpoint JSON API: every call is a POST
/// carrying `api_name`, the auth token, call parameters and a field list.
pub struct ProClient {
    client: Client,
    token: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    msg: Option<String>,
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

/// Column-major view of one API result: named columns over row-major cells.
#[derive(Debug, Clone, Default)]
pub struct ApiFrame {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

impl ApiFrame {
    pub fn new(fields: Vec<String>, items: Vec<Vec<Value>>) -> Self {
        Self { fields, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field == name)
    }

    fn cell(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column(name)?;
        self.items.get(row)?.get(col)
    }

    /// String cell; null and absent cells read as `None`.
    pub fn str_cell(&self, row: usize, name: &str) -> Option<&str> {
        self.cell(row, name).and_then(Value::as_str)
    }

    /// Numeric cell; the provider serializes some numbers as strings, so both
    /// representations are accepted. Null and absent cells read as `None`.
    pub fn f64_cell(&self, row: usize, name: &str) -> Option<f64> {
        self.cell(row, name).and_then(|value| {
            value
                .as_str()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .or_else(|| value.as_f64())
        })
    }

    /// Cell rendered for display: strings pass through, numbers are formatted.
    pub fn display_cell(&self, row: usize, name: &str) -> Option<String> {
        match self.cell(row, name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl ProClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_endpoint(token, PRO_ENDPOINT)
    }

    pub fn with_endpoint(token: &str, endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to construct provider HTTP client")?;

        Ok(Self {
            client,
            token: token.to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    /// One round trip against the provider. Network errors, error statuses and
    /// nonzero API codes all surface as errors; an empty result set does not.
    pub async fn query(&self, api_name: &str, params: Value, fields: &str) -> Result<ApiFrame> {
        let payload = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
            "fields": fields,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("{} request failed", api_name))?
            .error_for_status()
            .with_context(|| format!("{} request returned error status", api_name))?;

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response body", api_name))?;

        parse_api_response(&body, api_name)
    }

    /// Full security universe with the static reference columns.
    pub async fn stock_basic(&self) -> Result<ApiFrame> {
        self.query(
            "stock_basic",
            json!({}),
            "ts_code,name,list_date,market,industry",
        )
        .await
    }

    /// Daily bars for one security over a closed date range.
    pub async fn daily(&self, ts_code: &str, start_date: &str, end_date: &str) -> Result<ApiFrame> {
        self.query(
            "daily",
            json!({
                "ts_code": ts_code,
                "start_date": start_date,
                "end_date": end_date,
            }),
            DAILY_FIELDS,
        )
        .await
    }

    /// Company registration facts.
    pub async fn stock_company(&self, ts_code: &str) -> Result<ApiFrame> {
        self.query(
            "stock_company",
            json!({ "ts_code": ts_code }),
            "ts_code,province,city,reg_capital",
        )
        .await
    }

    /// Latest daily valuation metrics.
    pub async fn daily_basic(&self, ts_code: &str) -> Result<ApiFrame> {
        self.query(
            "daily_basic",
            json!({ "ts_code": ts_code }),
            "ts_code,total_mv,circ_mv,pe_ttm,pb,eps",
        )
        .await
    }

    /// Latest consolidated balance-sheet figures.
    pub async fn balancesheet(&self, ts_code: &str) -> Result<ApiFrame> {
        self.query(
            "balancesheet",
            json!({ "ts_code": ts_code, "report_type": "1" }),
            "ts_code,total_assets",
        )
        .await
    }

    /// Daily bars for one market index over a closed date range.
    pub async fn index_daily(
        &self,
        ts_code: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<ApiFrame> {
        self.query(
            "index_daily",
            json!({
                "ts_code": ts_code,
                "start_date": start_date,
                "end_date": end_date,
            }),
            INDEX_DAILY_FIELDS,
        )
        .await
    }
}

fn parse_api_response(body: &str, api_name: &str) -> Result<ApiFrame> {
    let parsed: ApiResponse = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse {} response JSON", api_name))?;

    if parsed.code != 0 {
        let msg = parsed.msg.unwrap_or_else(|| "unknown provider error".to_string());
        return Err(AppError::message(format!(
            "{} rejected by provider: {}",
            api_name, msg
        )));
    }

    let data = parsed
        .data
        .ok_or_else(|| AppError::message(format!("{} response missing data payload", api_name)))?;

    Ok(ApiFrame::new(data.fields, data.items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let body = r#"{
            "code": 0,
            "msg": null,
            "data": {
                "fields": ["trade_date", "open", "close"],
                "items": [
                    ["20240104", 10.5, "10.8"],
                    ["20240105", 10.8, 11.0]
                ]
            }
        }"#;

        let frame = parse_api_response(body, "daily").unwrap();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.str_cell(0, "trade_date"), Some("20240104"));
        assert!((frame.f64_cell(0, "open").unwrap() - 10.5).abs() < 1e-9);
        // string-encoded numbers are parsed too
        assert!((frame.f64_cell(0, "close").unwrap() - 10.8).abs() < 1e-9);
        assert_eq!(frame.f64_cell(0, "missing"), None);
    }

    #[test]
    fn nonzero_code_is_an_error() {
        let body = r#"{"code": 40203, "msg": "token invalid", "data": null}"#;

        let err = parse_api_response(body, "daily").unwrap_err();
        assert!(err.to_string().contains("token invalid"));
    }

    #[test]
    fn missing_data_payload_is_an_error() {
        let body = r#"{"code": 0, "msg": null}"#;

        assert!(parse_api_response(body, "stock_basic").is_err());
    }

    #[test]
    fn null_cells_read_as_none() {
        let frame = ApiFrame::new(
            vec!["ts_code".to_string(), "pe_ttm".to_string()],
            vec![vec![Value::String("000001.SZ".into()), Value::Null]],
        );

        assert_eq!(frame.f64_cell(0, "pe_ttm"), None);
        assert_eq!(frame.display_cell(0, "pe_ttm"), None);
        assert_eq!(frame.str_cell(0, "ts_code"), Some("000001.SZ"));
    }
}
