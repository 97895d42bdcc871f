/// Placeholder written in place of missing or unusable numeric data.
pub const MISSING: &str = "N/A";

/// Round a value to `decimals` places and render it, substituting the
/// missing-value sentinel when there is nothing usable to round.
pub fn safe_round(value: Option<f64>, decimals: u32) -> String {
    match value {
        Some(v) if v.is_finite() => {
            let factor = 10f64.powi(decimals as i32);
            ((v * factor).round() / factor).to_string()
        }
        _ => MISSING.to_string(),
    }
}
