use std::path::Path;

use chrono::NaiveDate;
use log::warn;
use plotters::prelude::*;

use crate::error::Result;
use crate::store::{TradeBar, KLINE_CHART_FILE, VOLUME_CHART_FILE};

// Fixed presentation constants: red up / green down per A-share convention.
const UP_COLOR: RGBColor = RGBColor(0xC0, 0x39, 0x2B);
const DOWN_COLOR: RGBColor = RGBColor(0x27, 0xAE, 0x60);
const BACKGROUND: RGBColor = RGBColor(0xF8, 0xF9, 0xF9);
const GRID_COLOR: RGBColor = RGBColor(0xD0, 0xD3, 0xD4);
const TITLE_COLOR: RGBColor = RGBColor(0x2C, 0x3E, 0x50);

const MA_WINDOWS: [usize; 4] = [5, 10, 20, 30];
const MA_LABELS: [&str; 4] = ["MA5", "MA10", "MA20", "MA30"];
const MA_COLORS: [RGBColor; 4] = [
    RGBColor(0, 0, 0),
    RGBColor(255, 255, 0),
    RGBColor(255, 0, 0),
    RGBColor(0, 128, 0),
];

const KLINE_SIZE: (u32, u32) = (1400, 700);
const VOLUME_SIZE: (u32, u32) = (1400, 500);

/// Trailing simple moving average; `None` until a full window is available.
pub fn moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, value) in values.iter().enumerate() {
        sum += value;
        if i >= window {
            sum -= values[i - window];
        }
        if window > 0 && i + 1 >= window {
            out.push(Some(sum / window as f64));
        } else {
            out.push(None);
        }
    }

    out
}

/// Restrict bars to the closed date window used for plotting.
pub fn window_bars<'a>(bars: &'a [TradeBar], start: NaiveDate, end: NaiveDate) -> Vec<&'a TradeBar> {
    bars.iter()
        .filter(|bar| bar.trade_date >= start && bar.trade_date <= end)
        .collect()
}

/// Render the candlestick and volume charts for one security into its
/// directory. Unusable input (no rows, window misses all rows, no volume
/// data) skips the affected chart with a log line rather than failing.
pub fn plot_stock_charts(
    code: &str,
    bars: &[TradeBar],
    save_dir: &Path,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<()> {
    if bars.is_empty() {
        warn!("no trade data to draw for {}", code);
        return Ok(());
    }

    let window = window_bars(bars, start, end);
    if window.is_empty() {
        warn!("no trade data inside the requested window for {}", code);
        return Ok(());
    }

    draw_kline(code, &window, &save_dir.join(KLINE_CHART_FILE))?;

    if window.iter().all(|bar| bar.vol.is_none()) {
        warn!("no volume data for {}, skipping volume chart", code);
        return Ok(());
    }
    draw_volume(code, &window, &save_dir.join(VOLUME_CHART_FILE))?;

    Ok(())
}

fn candle_width(count: usize) -> u32 {
    let per_candle = KLINE_SIZE.0 as usize / count.max(1);
    (per_candle.saturating_sub(2) as u32).clamp(1, 12)
}

fn date_label(dates: &[NaiveDate], x: f64) -> String {
    let idx = x.round();
    if idx < 0.0 {
        return String::new();
    }
    match dates.get(idx as usize) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => String::new(),
    }
}

fn draw_kline(code: &str, bars: &[&TradeBar], path: &Path) -> anyhow::Result<()> {
    let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
    let dates: Vec<NaiveDate> = bars.iter().map(|bar| bar.trade_date).collect();

    let y_min = bars.iter().map(|bar| bar.low).fold(f64::INFINITY, f64::min);
    let y_max = bars
        .iter()
        .map(|bar| bar.high)
        .fold(f64::NEG_INFINITY, f64::max);
    let pad = ((y_max - y_min) * 0.05).max(0.01);

    let root = BitMapBackend::new(path, KLINE_SIZE).into_drawing_area();
    root.fill(&BACKGROUND)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("K Line Chart for {}", code),
            ("sans-serif", 36).into_font().color(&TITLE_COLOR),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(-1.0..bars.len() as f64, (y_min - pad)..(y_max + pad))?;

    let formatter = |x: &f64| date_label(&dates, *x);
    chart
        .configure_mesh()
        .light_line_style(&GRID_COLOR)
        .x_labels(8)
        .x_label_formatter(&formatter)
        .y_desc("Price")
        .axis_desc_style(("sans-serif", 22))
        .label_style(("sans-serif", 16))
        .draw()?;

    let width = candle_width(bars.len());
    chart.draw_series(bars.iter().enumerate().map(|(i, bar)| {
        CandleStick::new(
            i as f64,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            UP_COLOR.filled(),
            DOWN_COLOR.filled(),
            width,
        )
    }))?;

    for (idx, window) in MA_WINDOWS.iter().enumerate() {
        let color = MA_COLORS[idx];
        let points: Vec<(f64, f64)> = moving_average(&closes, *window)
            .into_iter()
            .enumerate()
            .filter_map(|(i, avg)| avg.map(|value| (i as f64, value)))
            .collect();
        if points.is_empty() {
            continue;
        }

        chart
            .draw_series(LineSeries::new(
                points,
                ShapeStyle::from(&color).stroke_width(2),
            ))?
            .label(MA_LABELS[idx])
            .legend(move |(x, y)| {
                PathElement::new(
                    vec![(x, y), (x + 20, y)],
                    ShapeStyle::from(&color).stroke_width(2),
                )
            });
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(("sans-serif", 18))
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_volume(code: &str, bars: &[&TradeBar], path: &Path) -> anyhow::Result<()> {
    let dates: Vec<NaiveDate> = bars.iter().map(|bar| bar.trade_date).collect();
    let max_vol = bars
        .iter()
        .filter_map(|bar| bar.vol)
        .fold(0.0f64, f64::max)
        .max(1.0);

    let root = BitMapBackend::new(path, VOLUME_SIZE).into_drawing_area();
    root.fill(&BACKGROUND)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Trading Volume for {}", code),
            ("sans-serif", 36).into_font().color(&TITLE_COLOR),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(-1.0..bars.len() as f64, 0.0..max_vol * 1.05)?;

    let formatter = |x: &f64| date_label(&dates, *x);
    chart
        .configure_mesh()
        .light_line_style(&GRID_COLOR)
        .x_labels(8)
        .x_label_formatter(&formatter)
        .y_desc("Volume")
        .axis_desc_style(("sans-serif", 22))
        .label_style(("sans-serif", 16))
        .draw()?;

    chart.draw_series(bars.iter().enumerate().filter_map(|(i, bar)| {
        let vol = bar.vol?;
        let color = if bar.close >= bar.open {
            UP_COLOR
        } else {
            DOWN_COLOR
        };
        Some(Rectangle::new(
            [(i as f64 - 0.3, 0.0), (i as f64 + 0.3, vol)],
            ShapeStyle::from(&color).filled(),
        ))
    }))?;

    root.present()?;
    Ok(())
}
