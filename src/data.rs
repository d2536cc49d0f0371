use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AnalysisParams;
use crate::error::AnalysisError;

/// Single OHLC(V) candle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

/// Validated, immutable candle sequence sorted by strictly increasing timestamp.
///
/// Everything derived from a series (peaks, lines, levels) refers back to it by
/// index only.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    candles: Vec<Candle>,
}

impl Series {
    pub const MIN_LEN: usize = 2;

    pub fn new(candles: Vec<Candle>) -> Result<Self, AnalysisError> {
        if candles.len() < Self::MIN_LEN {
            return Err(AnalysisError::InsufficientData(format!(
                "need at least {} candles, got {}",
                Self::MIN_LEN,
                candles.len()
            )));
        }

        for (idx, pair) in candles.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(AnalysisError::InsufficientData(format!(
                    "timestamps must be strictly increasing (candle {} at {})",
                    idx + 1,
                    pair[1].timestamp
                )));
            }
        }

        if let Some(idx) = candles.iter().position(|c| {
            ![c.open, c.high, c.low, c.close]
                .iter()
                .all(|value| value.is_finite())
        }) {
            return Err(AnalysisError::InsufficientData(format!(
                "candle {idx} holds a non-finite price"
            )));
        }

        Ok(Self { candles })
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Never true for a constructed series.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn first(&self) -> &Candle {
        &self.candles[0]
    }

    pub fn last(&self) -> &Candle {
        &self.candles[self.candles.len() - 1]
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn max_high(&self) -> f64 {
        self.candles.iter().map(|c| c.high).fold(f64::MIN, f64::max)
    }

    pub fn min_low(&self) -> f64 {
        self.candles.iter().map(|c| c.low).fold(f64::MAX, f64::min)
    }

    /// Distance between the highest high and the lowest low.
    pub fn price_range(&self) -> f64 {
        (self.max_high() - self.min_low()).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PeakKind {
    Maximum,
    Minimum,
}

/// Locally prominent extremum, referenced by index into its series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peak {
    pub index: usize,
    pub price: f64,
    pub kind: PeakKind,
    pub prominence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineScope {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LineRole {
    Support,
    Resistance,
}

impl LineRole {
    /// Extremum family the line is built from.
    pub fn peak_kind(self) -> PeakKind {
        match self {
            LineRole::Support => PeakKind::Minimum,
            LineRole::Resistance => PeakKind::Maximum,
        }
    }

    /// Price of a candle that is tested against a line of this role.
    pub fn price_of(self, candle: &Candle) -> f64 {
        match self {
            LineRole::Support => candle.low,
            LineRole::Resistance => candle.high,
        }
    }

    /// Signed distance of `price` past the line; positive means the wrong side.
    pub fn excursion(self, price: f64, line_value: f64) -> f64 {
        match self {
            LineRole::Support => line_value - price,
            LineRole::Resistance => price - line_value,
        }
    }
}

impl fmt::Display for LineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineRole::Support => f.write_str("support"),
            LineRole::Resistance => f.write_str("resistance"),
        }
    }
}

/// Inclusive index range into a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexSpan {
    pub start: usize,
    pub end: usize,
}

impl IndexSpan {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchor {
    pub index: usize,
    pub price: f64,
}

/// Straight support or resistance line defined by two anchors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendLine {
    pub first: Anchor,
    pub second: Anchor,
    pub scope: LineScope,
    pub role: LineRole,
    /// Candles within tolerance of the line over its coverage.
    pub touch_count: usize,
    /// Largest wrong-side excursion from the line over its coverage.
    pub max_deviation: f64,
    pub coverage: IndexSpan,
}

impl TrendLine {
    pub fn slope(&self) -> f64 {
        if self.second.index == self.first.index {
            return 0.0;
        }
        (self.second.price - self.first.price) / (self.second.index as f64 - self.first.index as f64)
    }

    pub fn intercept(&self) -> f64 {
        self.first.price - self.slope() * self.first.index as f64
    }

    pub fn value_at(&self, index: usize) -> f64 {
        self.first.price + self.slope() * (index as f64 - self.first.index as f64)
    }

    /// Line value at `index`, or `None` outside the line's coverage.
    pub fn value_within_coverage(&self, index: usize) -> Option<f64> {
        self.coverage
            .contains(index)
            .then(|| self.value_at(index))
    }

    pub fn span(&self) -> usize {
        self.second.index.abs_diff(self.first.index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsychologicalLevel {
    pub rank: usize,
    pub price: f64,
    pub touch_count: usize,
}

/// Sub-detectors whose failures are reported per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    LocalResistance,
    LocalSupport,
    GlobalResistance,
    GlobalSupport,
    PsychologicalLevels,
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Detector::LocalResistance => "local resistance",
            Detector::LocalSupport => "local support",
            Detector::GlobalResistance => "global resistance",
            Detector::GlobalSupport => "global support",
            Detector::PsychologicalLevels => "psychological levels",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub detector: Detector,
    pub error: AnalysisError,
}

/// Output of one analysis run. Absent fields have a matching diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub local_resistance: Option<TrendLine>,
    pub local_support: Option<TrendLine>,
    pub global_resistance: Option<TrendLine>,
    pub global_support: Option<TrendLine>,
    pub psychological_levels: Vec<PsychologicalLevel>,
    pub params: AnalysisParams,
    /// Absolute tolerance the detectors ran with.
    pub tolerance: f64,
    pub working_window: IndexSpan,
    /// Rolling mean of the closes; entry `i` belongs to candle `i + window - 1`.
    pub moving_average: Vec<f64>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisResult {
    /// Moving-average value aligned to candle `index`, if the window is full there.
    pub fn moving_average_at(&self, index: usize) -> Option<f64> {
        let offset = self.params.moving_average_window.checked_sub(1)?;
        index
            .checked_sub(offset)
            .and_then(|idx| self.moving_average.get(idx).copied())
    }

    pub fn lines(&self) -> impl Iterator<Item = &TrendLine> {
        [
            &self.local_resistance,
            &self.local_support,
            &self.global_resistance,
            &self.global_support,
        ]
        .into_iter()
        .flatten()
    }

    pub fn diagnostic_for(&self, detector: Detector) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.detector == detector)
    }
}
