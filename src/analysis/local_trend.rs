use std::cmp::Ordering;

use log::debug;

use crate::analysis::line::{build_trend_line, evaluate, quantize, Line, LineEvaluation, TouchRule};
use crate::analysis::peaks::PeakSet;
use crate::data::{Anchor, IndexSpan, LineRole, LineScope, Series, TrendLine};
use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy)]
struct LocalCandidate {
    line: Line,
    span: IndexSpan,
    evaluation: LineEvaluation,
    quality: i64,
}

/// Fits the `role` line of the current regime through the extrema inside
/// `window`.
///
/// Every suffix of the in-window extrema (at least two of them) is fitted with
/// Theil–Sen and judged over the candles from its first extremum to the end of
/// the window. Quality is the touch count minus the excess deviation past the
/// tolerance, in tolerance units. Ties go to the lower deviation, then to the
/// subset that starts closest to the end of the series.
pub fn fit_local_line(
    series: &Series,
    peaks: &PeakSet,
    window: IndexSpan,
    role: LineRole,
    tolerance: f64,
) -> Result<TrendLine, AnalysisError> {
    let extrema: Vec<(f64, f64)> = peaks
        .of_kind(role.peak_kind())
        .iter()
        .filter(|peak| window.contains(peak.index))
        .map(|peak| (peak.index as f64, peak.price))
        .collect();
    if extrema.len() < 2 {
        return Err(AnalysisError::NoLocalTrend {
            role,
            extrema: extrema.len(),
        });
    }

    let best = (0..extrema.len() - 1)
        .filter_map(|start| {
            let subset = &extrema[start..];
            let line = Line::theil_sen(subset)?;
            let span = IndexSpan::new(subset[0].0 as usize, window.end);
            let evaluation = evaluate(series, &line, role, span, tolerance, TouchRule::EitherSide);
            let excess = (evaluation.max_deviation - tolerance).max(0.0);
            let quality = quantize(evaluation.touch_count as f64 - excess / tolerance);
            Some(LocalCandidate {
                line,
                span,
                evaluation,
                quality,
            })
        })
        .max_by(compare_candidates)
        .ok_or(AnalysisError::NoLocalTrend {
            role,
            extrema: extrema.len(),
        })?;

    debug!(
        "local {}: slope {:.6}, {} touches over {}..={}",
        role, best.line.slope, best.evaluation.touch_count, best.span.start, best.span.end
    );

    let anchor = |index: usize| Anchor {
        index,
        price: best.line.value_at(index as f64),
    };
    Ok(build_trend_line(
        anchor(best.span.start),
        anchor(best.span.end),
        LineScope::Local,
        role,
        best.evaluation,
        best.span,
    ))
}

/// `Greater` means `a` is the better fit.
fn compare_candidates(a: &LocalCandidate, b: &LocalCandidate) -> Ordering {
    a.quality
        .cmp(&b.quality)
        .then_with(|| {
            b.evaluation
                .max_deviation
                .total_cmp(&a.evaluation.max_deviation)
        })
        .then_with(|| a.span.start.cmp(&b.span.start))
}
