use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use tabled::{settings::Style, Table, Tabled};

use crate::data::{AnalysisResult, Detector, LineScope, Series, TrendLine};

/// Report sections the user asked to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSections {
    pub local: bool,
    pub global: bool,
    pub levels: bool,
}

impl Default for ReportSections {
    fn default() -> Self {
        Self {
            local: true,
            global: true,
            levels: true,
        }
    }
}

impl ReportSections {
    fn shows(&self, detector: Detector) -> bool {
        match detector {
            Detector::LocalResistance | Detector::LocalSupport => self.local,
            Detector::GlobalResistance | Detector::GlobalSupport => self.global,
            Detector::PsychologicalLevels => self.levels,
        }
    }
}

/// Headline numbers for the latest candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSummary {
    pub current: f64,
    pub change: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
}

impl PriceSummary {
    pub fn from_series(series: &Series) -> Self {
        let candles = series.candles();
        let current = series.last().close;
        let previous = candles[candles.len() - 2].close;
        let change = current - previous;
        let change_pct = if previous != 0.0 {
            change / previous * 100.0
        } else {
            0.0
        };
        Self {
            current,
            change,
            change_pct,
            high: series.max_high(),
            low: series.min_low(),
        }
    }
}

#[derive(Tabled)]
struct LineRow {
    #[tabled(rename = "Line")]
    name: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Start")]
    start_price: String,
    #[tabled(rename = "End")]
    end_price: String,
    #[tabled(rename = "Slope/bar")]
    slope: String,
    #[tabled(rename = "Touches")]
    touches: usize,
    #[tabled(rename = "Max Dev")]
    max_deviation: String,
}

#[derive(Tabled)]
struct LevelRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Touches")]
    touches: usize,
    #[tabled(rename = "vs Current")]
    distance: String,
}

pub fn print_report(series: &Series, result: &AnalysisResult, tz: Tz, sections: ReportSections) {
    let summary = PriceSummary::from_series(series);
    let format_time = |index: usize| {
        series
            .get(index)
            .map(|candle| {
                candle
                    .timestamp
                    .with_timezone(&tz)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string())
    };

    println!("\n=== Trend & Level Map ===\n");
    println!(
        "Current Price: {:.2} ({:+.2}, {:+.2}%)",
        summary.current, summary.change, summary.change_pct
    );
    println!("High: {:.2} | Low: {:.2}", summary.high, summary.low);
    println!(
        "Candles: {} ({} to {}) | Current regime since {} | Tolerance {:.4}",
        series.len(),
        format_time(0),
        format_time(series.len() - 1),
        format_time(result.working_window.start),
        result.tolerance
    );

    let rows: Vec<LineRow> = [
        ("Local resistance", &result.local_resistance),
        ("Local support", &result.local_support),
        ("Global resistance", &result.global_resistance),
        ("Global support", &result.global_support),
    ]
    .into_iter()
    .filter_map(|(name, line)| line.as_ref().map(|line| (name, line)))
    .filter(|(_, line)| match line.scope {
        LineScope::Local => sections.local,
        LineScope::Global => sections.global,
    })
    .map(|(name, line)| line_row(name, line, &format_time))
    .collect();

    if !rows.is_empty() {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("\n{table}");
    }

    if sections.levels && !result.psychological_levels.is_empty() {
        let rows: Vec<LevelRow> = result
            .psychological_levels
            .iter()
            .map(|level| LevelRow {
                rank: level.rank,
                price: format!("{:.2}", level.price),
                touches: level.touch_count,
                distance: if summary.current != 0.0 {
                    format!("{:+.2}%", (level.price / summary.current - 1.0) * 100.0)
                } else {
                    "-".to_string()
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("\nPsychological levels\n{table}");
    }

    let missing: Vec<String> = result
        .diagnostics
        .iter()
        .filter(|diagnostic| sections.shows(diagnostic.detector))
        .map(|diagnostic| {
            format!(
                "Could not detect {}: {}",
                diagnostic.detector, diagnostic.error
            )
        })
        .collect();
    if !missing.is_empty() {
        println!();
        for line in missing {
            println!("{line}");
        }
    }
    println!();
}

fn line_row(name: &str, line: &TrendLine, format_time: &dyn Fn(usize) -> String) -> LineRow {
    LineRow {
        name: name.to_string(),
        from: format_time(line.first.index),
        to: format_time(line.second.index),
        start_price: format!("{:.2}", line.first.price),
        end_price: format!("{:.2}", line.second.price),
        slope: format!("{:+.4}", line.slope()),
        touches: line.touch_count,
        max_deviation: format!("{:.4}", line.max_deviation),
    }
}

/// Column names of the per-candle export.
pub fn export_header(result: &AnalysisResult) -> Vec<String> {
    let mut header: Vec<String> = [
        "timestamp",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "moving_average",
        "local_resistance",
        "local_support",
        "global_resistance",
        "global_support",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect();
    for level in &result.psychological_levels {
        header.push(format!("level_{}", level.rank));
        header.push(format!("level_{}_touches", level.rank));
    }
    header
}

/// Writes one row per candle with the moving average, every line inside its
/// coverage and the psychological levels.
pub fn write_export<P: AsRef<Path>>(
    path: P,
    series: &Series,
    result: &AnalysisResult,
    tz: Tz,
) -> Result<()> {
    let path_ref = path.as_ref();
    let mut writer = csv::Writer::from_path(path_ref)
        .with_context(|| format!("failed to create {:?}", path_ref))?;
    writer.write_record(export_header(result))?;

    let optional = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    let line_value = |line: &Option<TrendLine>, index: usize| {
        optional(line.as_ref().and_then(|l| l.value_within_coverage(index)))
    };

    for (index, candle) in series.candles().iter().enumerate() {
        let mut record = vec![
            candle.timestamp.with_timezone(&tz).to_rfc3339(),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            optional(candle.volume),
            optional(result.moving_average_at(index)),
            line_value(&result.local_resistance, index),
            line_value(&result.local_support, index),
            line_value(&result.global_resistance, index),
            line_value(&result.global_support, index),
        ];
        for level in &result.psychological_levels {
            record.push(level.price.to_string());
            record.push(level.touch_count.to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_levels_export<P: AsRef<Path>>(path: P, result: &AnalysisResult) -> Result<()> {
    let path_ref = path.as_ref();
    let mut writer = csv::Writer::from_path(path_ref)
        .with_context(|| format!("failed to create {:?}", path_ref))?;
    for level in &result.psychological_levels {
        writer.serialize(level)?;
    }
    writer.flush()?;
    Ok(())
}
