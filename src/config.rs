use std::path::PathBuf;

use chrono::{DateTime, Months, Utc};
use chrono_tz::Tz;
use clap::{ArgAction, Parser, ValueEnum};
use statrs::statistics::{Data, Median};

use crate::data::Series;
use crate::error::AnalysisError;

/// Command-line configuration for the trend and level mapping tool.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Input CSV file path containing OHLC(V) data.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input_path: PathBuf,

    /// Look-back period kept before analysis, counted back from the last candle.
    #[arg(long, value_enum, default_value_t = LookbackPeriod::Max)]
    pub period: LookbackPeriod,

    /// Time zone used for timestamps without an explicit offset.
    #[arg(long, default_value = "UTC", value_parser = parse_timezone)]
    pub timezone: Tz,

    /// Moving-average window length (candles) delimiting the current regime.
    #[arg(long = "ma-window", default_value_t = AnalysisParams::DEFAULT_MA_WINDOW)]
    pub moving_average_window: usize,

    /// Peak prominence threshold as a fraction of the price range; lower keeps more peaks.
    #[arg(long, default_value_t = AnalysisParams::DEFAULT_SENSITIVITY)]
    pub sensitivity: f64,

    /// Number of psychological levels to report.
    #[arg(long, default_value_t = AnalysisParams::DEFAULT_LEVEL_COUNT)]
    pub levels: usize,

    /// Absolute touch tolerance in price units (defaults to 1% of the median close).
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Minimum touches for a global line to be admissible.
    #[arg(long, default_value_t = AnalysisParams::DEFAULT_MIN_TOUCHES)]
    pub min_touches: usize,

    /// Hide local trend lines in the report.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_local: bool,

    /// Hide global trend lines in the report.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_global: bool,

    /// Hide psychological levels in the report.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_levels: bool,

    /// Write the per-candle analysis table to this CSV file.
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Write the psychological levels to this CSV file.
    #[arg(long, value_name = "FILE")]
    pub levels_export: Option<PathBuf>,
}

impl AppConfig {
    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams {
            moving_average_window: self.moving_average_window,
            peak_sensitivity: self.sensitivity,
            psychological_level_count: self.levels,
            tolerance: match self.tolerance {
                Some(value) => Tolerance::Absolute(value),
                None => Tolerance::Auto,
            },
            min_touches: self.min_touches,
            score_weights: ScoreWeights::default(),
        }
    }
}

fn parse_timezone(value: &str) -> Result<Tz, String> {
    value.parse::<Tz>().map_err(|err| err.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LookbackPeriod {
    #[value(name = "1mo")]
    OneMonth,
    #[value(name = "3mo")]
    ThreeMonths,
    #[value(name = "6mo")]
    SixMonths,
    #[value(name = "1y")]
    OneYear,
    #[value(name = "2y")]
    TwoYears,
    #[value(name = "5y")]
    FiveYears,
    #[value(name = "max")]
    Max,
}

impl LookbackPeriod {
    fn months(self) -> Option<u32> {
        match self {
            LookbackPeriod::OneMonth => Some(1),
            LookbackPeriod::ThreeMonths => Some(3),
            LookbackPeriod::SixMonths => Some(6),
            LookbackPeriod::OneYear => Some(12),
            LookbackPeriod::TwoYears => Some(24),
            LookbackPeriod::FiveYears => Some(60),
            LookbackPeriod::Max => None,
        }
    }

    /// Earliest timestamp kept when the latest candle is at `last`.
    pub fn cutoff(self, last: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.months()
            .and_then(|months| last.checked_sub_months(Months::new(months)))
    }
}

/// Absolute price distance within which a candle "touches" a line or level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    /// `AUTO_TOLERANCE_RATIO` times the median close.
    Auto,
    Absolute(f64),
}

/// Weights of the global line score:
/// `touches * touch - deviation * (max_deviation / tolerance) + span * (span / (len - 1))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub touch: f64,
    pub deviation: f64,
    pub span: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            touch: 1.0,
            deviation: 2.0,
            span: 10.0,
        }
    }
}

/// Immutable parameter set handed to every detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisParams {
    pub moving_average_window: usize,
    pub peak_sensitivity: f64,
    pub psychological_level_count: usize,
    pub tolerance: Tolerance,
    pub min_touches: usize,
    pub score_weights: ScoreWeights,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            moving_average_window: Self::DEFAULT_MA_WINDOW,
            peak_sensitivity: Self::DEFAULT_SENSITIVITY,
            psychological_level_count: Self::DEFAULT_LEVEL_COUNT,
            tolerance: Tolerance::Auto,
            min_touches: Self::DEFAULT_MIN_TOUCHES,
            score_weights: ScoreWeights::default(),
        }
    }
}

impl AnalysisParams {
    pub const DEFAULT_MA_WINDOW: usize = 200;
    pub const DEFAULT_SENSITIVITY: f64 = 0.15;
    pub const DEFAULT_LEVEL_COUNT: usize = 10;
    pub const DEFAULT_MIN_TOUCHES: usize = 2;

    pub const MA_WINDOW_RANGE: (usize, usize) = (50, 500);
    pub const SENSITIVITY_RANGE: (f64, f64) = (0.05, 0.50);
    pub const LEVEL_COUNT_RANGE: (usize, usize) = (3, 15);

    pub const AUTO_TOLERANCE_RATIO: f64 = 0.01;
    const MIN_TOLERANCE: f64 = 1e-9;

    /// Checks every parameter against its documented range and the series length.
    pub fn validate(&self, series_len: usize) -> Result<(), AnalysisError> {
        let (min_window, max_window) = Self::MA_WINDOW_RANGE;
        if !(min_window..=max_window).contains(&self.moving_average_window) {
            return Err(AnalysisError::invalid(
                "moving_average_window",
                format!(
                    "{} is outside {min_window}..={max_window}",
                    self.moving_average_window
                ),
            ));
        }
        if self.moving_average_window > series_len {
            return Err(AnalysisError::invalid(
                "moving_average_window",
                format!(
                    "{} exceeds the series length {series_len}",
                    self.moving_average_window
                ),
            ));
        }

        let (min_sens, max_sens) = Self::SENSITIVITY_RANGE;
        if !(min_sens..=max_sens).contains(&self.peak_sensitivity) {
            return Err(AnalysisError::invalid(
                "peak_sensitivity",
                format!("{} is outside {min_sens}..={max_sens}", self.peak_sensitivity),
            ));
        }

        let (min_levels, max_levels) = Self::LEVEL_COUNT_RANGE;
        if !(min_levels..=max_levels).contains(&self.psychological_level_count) {
            return Err(AnalysisError::invalid(
                "psychological_level_count",
                format!(
                    "{} is outside {min_levels}..={max_levels}",
                    self.psychological_level_count
                ),
            ));
        }

        if let Tolerance::Absolute(value) = self.tolerance {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalysisError::invalid(
                    "tolerance",
                    format!("{value} must be a positive price distance"),
                ));
            }
        }

        if self.min_touches < 2 {
            return Err(AnalysisError::invalid(
                "min_touches",
                format!("{} is below 2", self.min_touches),
            ));
        }

        let weights = self.score_weights;
        if ![weights.touch, weights.deviation, weights.span]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
        {
            return Err(AnalysisError::invalid(
                "score_weights",
                "weights must be finite and non-negative",
            ));
        }

        Ok(())
    }

    /// Absolute tolerance for `series`.
    pub fn resolve_tolerance(&self, series: &Series) -> f64 {
        match self.tolerance {
            Tolerance::Absolute(value) => value,
            Tolerance::Auto => {
                let median = Data::new(series.closes()).median();
                let value = Self::AUTO_TOLERANCE_RATIO * median.abs();
                if value.is_finite() {
                    value.max(Self::MIN_TOLERANCE)
                } else {
                    Self::MIN_TOLERANCE
                }
            }
        }
    }
}
