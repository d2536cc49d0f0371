use std::cmp::Ordering;

use log::debug;
use rayon::prelude::*;

use crate::analysis::line::{
    build_trend_line, evaluate, quantize, Line, LineEvaluation, TouchRule, SCORE_RESOLUTION,
};
use crate::config::ScoreWeights;
use crate::data::{Anchor, IndexSpan, LineRole, LineScope, Peak, Series, TrendLine};
use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy)]
struct PairCandidate {
    first: Anchor,
    second: Anchor,
    evaluation: LineEvaluation,
    score: i64,
}

impl PairCandidate {
    fn span(&self) -> usize {
        self.second.index - self.first.index
    }
}

/// Selects the best admissible `role` line through a pair of `peaks`.
///
/// A pair is admissible when no candle between its anchors crosses the line by
/// more than `tolerance` and at least `min_touches` candles of the span touch it
/// from the correct side. The pair scan runs on the rayon pool; the reduction is
/// a total order, so the outcome does not depend on scheduling.
pub fn score_global_line(
    series: &Series,
    peaks: &[Peak],
    role: LineRole,
    tolerance: f64,
    min_touches: usize,
    weights: &ScoreWeights,
) -> Result<TrendLine, AnalysisError> {
    let count = peaks.len();
    let best = (0..count)
        .into_par_iter()
        .flat_map_iter(|i| (i + 1..count).map(move |j| (i, j)))
        .filter_map(|(i, j)| {
            evaluate_pair(series, &peaks[i], &peaks[j], role, tolerance, min_touches, weights)
        })
        .max_by(compare_candidates)
        .ok_or(AnalysisError::NoGlobalTrend { role })?;

    debug!(
        "global {}: anchors {} -> {}, {} touches, score {}",
        role,
        best.first.index,
        best.second.index,
        best.evaluation.touch_count,
        best.score as f64 * SCORE_RESOLUTION
    );

    Ok(build_trend_line(
        best.first,
        best.second,
        LineScope::Global,
        role,
        best.evaluation,
        IndexSpan::new(best.first.index, best.second.index),
    ))
}

fn evaluate_pair(
    series: &Series,
    a: &Peak,
    b: &Peak,
    role: LineRole,
    tolerance: f64,
    min_touches: usize,
    weights: &ScoreWeights,
) -> Option<PairCandidate> {
    let (first, second) = if a.index <= b.index { (a, b) } else { (b, a) };
    if first.index == second.index {
        return None;
    }

    let line = Line::through(
        first.index as f64,
        first.price,
        second.index as f64,
        second.price,
    );
    let span = IndexSpan::new(first.index, second.index);
    let evaluation = evaluate(series, &line, role, span, tolerance, TouchRule::CorrectSide);
    if evaluation.max_deviation > tolerance || evaluation.touch_count < min_touches {
        return None;
    }

    let length = (second.index - first.index) as f64 / (series.len() - 1) as f64;
    let score = weights.touch * evaluation.touch_count as f64
        - weights.deviation * (evaluation.max_deviation / tolerance)
        + weights.span * length;

    Some(PairCandidate {
        first: Anchor {
            index: first.index,
            price: first.price,
        },
        second: Anchor {
            index: second.index,
            price: second.price,
        },
        evaluation,
        score: quantize(score),
    })
}

/// `Greater` means `a` is the better line: higher score, then longer span, then
/// lower deviation, then earlier anchors.
fn compare_candidates(a: &PairCandidate, b: &PairCandidate) -> Ordering {
    a.score
        .cmp(&b.score)
        .then_with(|| a.span().cmp(&b.span()))
        .then_with(|| {
            b.evaluation
                .max_deviation
                .total_cmp(&a.evaluation.max_deviation)
        })
        .then_with(|| b.first.index.cmp(&a.first.index))
        .then_with(|| b.second.index.cmp(&a.second.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Candle, PeakKind};
    use chrono::{TimeZone, Utc};

    fn series(highs: &[f64]) -> Series {
        let candles = highs
            .iter()
            .enumerate()
            .map(|(i, &high)| Candle {
                timestamp: Utc.timestamp_opt(i as i64 * 86_400, 0).unwrap(),
                open: high - 1.0,
                high,
                low: high - 2.0,
                close: high - 1.0,
                volume: None,
            })
            .collect();
        Series::new(candles).unwrap()
    }

    fn maxima(series: &Series, indices: &[usize]) -> Vec<Peak> {
        indices
            .iter()
            .map(|&index| Peak {
                index,
                price: series.get(index).unwrap().high,
                kind: PeakKind::Maximum,
                prominence: 1.0,
            })
            .collect()
    }

    #[test]
    fn picks_the_line_with_most_touches() {
        // Four highs at 10 on a flat ceiling; one higher spike at index 8.
        let highs = [9.0, 10.0, 9.0, 10.0, 9.0, 10.0, 9.0, 10.0, 12.0, 9.0];
        let series = series(&highs);
        let peaks = maxima(&series, &[1, 3, 5, 7, 8]);

        let line = score_global_line(
            &series,
            &peaks,
            LineRole::Resistance,
            0.05,
            2,
            &ScoreWeights::default(),
        )
        .unwrap();
        assert_eq!(line.first.index, 1);
        assert_eq!(line.second.index, 7);
        assert_eq!(line.touch_count, 4);
        assert_eq!(line.scope, LineScope::Global);
        assert_eq!(line.coverage, IndexSpan::new(1, 7));
    }

    #[test]
    fn broken_lines_are_not_admissible() {
        // The peak at 3 pokes through every line joining 1 and 5.
        let highs = [5.0, 8.0, 6.0, 11.0, 6.0, 8.0, 5.0];
        let series = series(&highs);
        let peaks = maxima(&series, &[1, 5]);

        let err = score_global_line(
            &series,
            &peaks,
            LineRole::Resistance,
            0.5,
            2,
            &ScoreWeights::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::NoGlobalTrend {
                role: LineRole::Resistance
            }
        );
    }

    #[test]
    fn min_touches_filters_lines() {
        let highs = [5.0, 8.0, 6.0, 7.0, 6.0, 8.0, 5.0];
        let series = series(&highs);
        let peaks = maxima(&series, &[1, 5]);
        let weights = ScoreWeights::default();

        assert!(score_global_line(&series, &peaks, LineRole::Resistance, 0.5, 2, &weights).is_ok());
        assert!(score_global_line(&series, &peaks, LineRole::Resistance, 0.5, 3, &weights).is_err());
    }

    #[test]
    fn equal_scores_prefer_the_longer_span() {
        let first = Anchor {
            index: 2,
            price: 1.0,
        };
        let evaluation = LineEvaluation {
            touch_count: 3,
            max_deviation: 0.0,
        };
        let short = PairCandidate {
            first,
            second: Anchor {
                index: 10,
                price: 1.0,
            },
            evaluation,
            score: 42,
        };
        let long = PairCandidate {
            second: Anchor {
                index: 20,
                price: 1.0,
            },
            ..short
        };
        assert_eq!(compare_candidates(&long, &short), Ordering::Greater);
    }
}
