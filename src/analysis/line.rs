use itertools::Itertools;
use statrs::statistics::{Data, Median};

use crate::data::{Anchor, IndexSpan, LineRole, LineScope, Series, TrendLine};

/// Scores closer than this are treated as equal before tie-breaking.
pub(crate) const SCORE_RESOLUTION: f64 = 1e-9;

/// Relative slack for a point sitting exactly on a line.
const ON_LINE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Line {
    pub slope: f64,
    pub intercept: f64,
}

impl Line {
    pub fn through(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let slope = if x2 != x1 { (y2 - y1) / (x2 - x1) } else { 0.0 };
        Self {
            slope,
            intercept: y1 - slope * x1,
        }
    }

    /// Theil–Sen fit: median of pairwise slopes, then median intercept.
    pub fn theil_sen(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }

        let slopes: Vec<f64> = points
            .iter()
            .tuple_combinations()
            .filter(|(a, b)| a.0 != b.0)
            .map(|(a, b)| (b.1 - a.1) / (b.0 - a.0))
            .collect();
        if slopes.is_empty() {
            return None;
        }
        let slope = Data::new(slopes).median();

        let intercepts: Vec<f64> = points.iter().map(|(x, y)| y - slope * x).collect();
        let intercept = Data::new(intercepts).median();

        (slope.is_finite() && intercept.is_finite()).then_some(Self { slope, intercept })
    }

    pub fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Which candles count as touching a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TouchRule {
    /// Within tolerance on either side.
    EitherSide,
    /// Within tolerance and not past the line.
    CorrectSide,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LineEvaluation {
    pub touch_count: usize,
    /// Largest wrong-side excursion, never negative.
    pub max_deviation: f64,
}

/// Tests the candles of `span` against `line` for the given role.
pub(crate) fn evaluate(
    series: &Series,
    line: &Line,
    role: LineRole,
    span: IndexSpan,
    tolerance: f64,
    rule: TouchRule,
) -> LineEvaluation {
    let mut touch_count = 0usize;
    let mut max_deviation: f64 = 0.0;

    for (index, candle) in series
        .candles()
        .iter()
        .enumerate()
        .take(span.end + 1)
        .skip(span.start)
    {
        let line_value = line.value_at(index as f64);
        let excursion = role.excursion(role.price_of(candle), line_value);
        max_deviation = max_deviation.max(excursion);

        let on_line_slack = ON_LINE_EPSILON * line_value.abs().max(1.0);
        let touched = match rule {
            TouchRule::EitherSide => excursion.abs() <= tolerance,
            TouchRule::CorrectSide => excursion <= on_line_slack && -excursion <= tolerance,
        };
        if touched {
            touch_count += 1;
        }
    }

    LineEvaluation {
        touch_count,
        max_deviation,
    }
}

pub(crate) fn quantize(score: f64) -> i64 {
    (score / SCORE_RESOLUTION).round() as i64
}

pub(crate) fn build_trend_line(
    first: Anchor,
    second: Anchor,
    scope: LineScope,
    role: LineRole,
    evaluation: LineEvaluation,
    coverage: IndexSpan,
) -> TrendLine {
    TrendLine {
        first,
        second,
        scope,
        role,
        touch_count: evaluation.touch_count,
        max_deviation: evaluation.max_deviation,
        coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Candle;
    use chrono::{TimeZone, Utc};

    fn series_from_lows(lows: &[f64]) -> Series {
        let candles = lows
            .iter()
            .enumerate()
            .map(|(i, &low)| Candle {
                timestamp: Utc.timestamp_opt(i as i64 * 60, 0).unwrap(),
                open: low + 1.0,
                high: low + 2.0,
                low,
                close: low + 1.0,
                volume: None,
            })
            .collect();
        Series::new(candles).unwrap()
    }

    #[test]
    fn theil_sen_ignores_a_single_outlier() {
        let points = [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0), (3.0, 40.0), (4.0, 9.0)];
        let line = Line::theil_sen(&points).unwrap();
        assert!((line.slope - 2.0).abs() < 1e-12);
        assert!((line.intercept - 1.0).abs() < 1e-12);
    }

    #[test]
    fn theil_sen_needs_two_distinct_x() {
        assert!(Line::theil_sen(&[(1.0, 1.0)]).is_none());
        assert!(Line::theil_sen(&[(1.0, 1.0), (1.0, 2.0)]).is_none());
    }

    #[test]
    fn support_touches_respect_the_rule() {
        let series = series_from_lows(&[10.0, 10.4, 9.8, 11.5, 10.0]);
        let line = Line::through(0.0, 10.0, 4.0, 10.0);
        let span = IndexSpan::new(0, 4);

        let either = evaluate(&series, &line, LineRole::Support, span, 0.5, TouchRule::EitherSide);
        assert_eq!(either.touch_count, 4);
        assert!((either.max_deviation - 0.2).abs() < 1e-12);

        let correct = evaluate(&series, &line, LineRole::Support, span, 0.5, TouchRule::CorrectSide);
        assert_eq!(correct.touch_count, 3);
    }
}
