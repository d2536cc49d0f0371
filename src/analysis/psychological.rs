use std::cmp::Ordering;

use log::debug;
use statrs::statistics::Statistics;

use crate::data::{PsychologicalLevel, Series};
use crate::error::AnalysisError;

/// Interval width is `WIDTH_COEFFICIENT * sigma / level_count`, where
/// `sigma = sqrt(var(high) + var(low))`.
pub const WIDTH_COEFFICIENT: f64 = 2.0;

/// Each interval is split into this many sub-bins when counting touches.
pub const SUB_BINS_PER_INTERVAL: usize = 64;

/// Upper bound on the number of intervals across the price range.
const MAX_INTERVALS: f64 = 1_000.0;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    price: f64,
    touch_count: usize,
}

/// Width of the price intervals searched for one level each.
pub fn interval_width(series: &Series, level_count: usize) -> f64 {
    let sigma = (series.highs().variance() + series.lows().variance()).sqrt();
    WIDTH_COEFFICIENT * sigma / level_count.max(1) as f64
}

/// Ranks the most-touched price of every variance-sized interval and returns
/// up to `level_count` of them, strongest first.
///
/// A candle touches every sub-bin its low-high range intersects. Candidates
/// within `tolerance` of a stronger level are dropped.
pub fn find_psychological_levels(
    series: &Series,
    level_count: usize,
    tolerance: f64,
) -> Result<Vec<PsychologicalLevel>, AnalysisError> {
    let min_price = series.min_low();
    let max_price = series.max_high();
    let range = max_price - min_price;

    if range <= 0.0 {
        // Every candle sits on one price.
        return Ok(vec![PsychologicalLevel {
            rank: 1,
            price: min_price,
            touch_count: series.len(),
        }]);
    }

    let mut width = interval_width(series, level_count);
    if !width.is_finite() || width <= 0.0 {
        width = range;
    }
    width = width.max(range / MAX_INTERVALS);

    let intervals = ((range / width).ceil() as usize).max(1);
    let total_bins = intervals * SUB_BINS_PER_INTERVAL;
    let sub_width = width / SUB_BINS_PER_INTERVAL as f64;
    let bin_of = |price: f64| -> usize {
        let offset = ((price - min_price) / sub_width).floor().max(0.0) as usize;
        offset.min(total_bins - 1)
    };

    // Range increments through a difference array, then a running sum.
    let mut deltas = vec![0i64; total_bins + 1];
    for candle in series.candles() {
        let (low, high) = if candle.low <= candle.high {
            (candle.low, candle.high)
        } else {
            (candle.high, candle.low)
        };
        deltas[bin_of(low)] += 1;
        deltas[bin_of(high) + 1] -= 1;
    }
    let mut running = 0i64;
    let counts: Vec<usize> = deltas[..total_bins]
        .iter()
        .map(|delta| {
            running += delta;
            running.max(0) as usize
        })
        .collect();

    let mut candidates: Vec<Candidate> = counts
        .chunks(SUB_BINS_PER_INTERVAL)
        .enumerate()
        .filter_map(|(interval, bins)| {
            // First maximum, i.e. the lowest price on ties.
            let (offset, &touch_count) = bins
                .iter()
                .enumerate()
                .fold(None, |best: Option<(usize, &usize)>, (idx, count)| match best {
                    Some((_, best_count)) if best_count >= count => best,
                    _ => Some((idx, count)),
                })?;
            if touch_count == 0 {
                return None;
            }
            let bin = interval * SUB_BINS_PER_INTERVAL + offset;
            let price = (min_price + (bin as f64 + 0.5) * sub_width).min(max_price);
            Some(Candidate { price, touch_count })
        })
        .collect();

    if candidates.is_empty() {
        return Err(AnalysisError::InsufficientLevels);
    }
    debug!(
        "psychological levels: {} intervals of width {:.6}, {} candidates",
        intervals,
        width,
        candidates.len()
    );

    candidates.sort_by(|a, b| match b.touch_count.cmp(&a.touch_count) {
        Ordering::Equal => a.price.total_cmp(&b.price),
        other => other,
    });

    let mut accepted: Vec<Candidate> = Vec::with_capacity(level_count);
    for candidate in candidates {
        if accepted.len() == level_count {
            break;
        }
        if accepted
            .iter()
            .any(|level| (level.price - candidate.price).abs() <= tolerance)
        {
            continue;
        }
        accepted.push(candidate);
    }

    Ok(accepted
        .into_iter()
        .enumerate()
        .map(|(idx, candidate)| PsychologicalLevel {
            rank: idx + 1,
            price: candidate.price,
            touch_count: candidate.touch_count,
        })
        .collect())
}
