use log::debug;

use crate::data::IndexSpan;
use crate::error::AnalysisError;

/// Rolling mean of a price series and the regime it currently trends in.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendRegime {
    /// One value per full window; entry `i` ends at sample `i + window - 1`.
    pub moving_average: Vec<f64>,
    /// Series index of the most recent reversal of the average (0 when none).
    pub reversal_index: usize,
    pub working_window: IndexSpan,
}

/// Simple rolling mean over `window` samples.
pub fn simple_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }

    let mut averages = Vec::with_capacity(values.len() - window + 1);
    let mut sum: f64 = values[..window].iter().sum();
    averages.push(sum / window as f64);
    for idx in window..values.len() {
        sum += values[idx] - values[idx - window];
        averages.push(sum / window as f64);
    }
    averages
}

/// Computes the rolling mean of `closes` and locates its last direction change.
///
/// The working window runs from the reversal to the final sample. A monotonic
/// average has no reversal and the window covers the whole series.
pub fn detect_reversal(closes: &[f64], window: usize) -> Result<TrendRegime, AnalysisError> {
    if window == 0 || window > closes.len() {
        return Err(AnalysisError::invalid(
            "moving_average_window",
            format!("{window} does not fit a series of {} samples", closes.len()),
        ));
    }

    let moving_average = simple_moving_average(closes, window);
    let reversal_index = last_turning_point(&moving_average)
        .map(|ma_idx| ma_idx + window - 1)
        .unwrap_or(0);
    let working_window = IndexSpan::new(reversal_index, closes.len() - 1);
    debug!(
        "moving average ({} samples): working window {}..={} ({} candles)",
        window,
        working_window.start,
        working_window.end,
        working_window.len()
    );

    Ok(TrendRegime {
        moving_average,
        reversal_index,
        working_window,
    })
}

/// Index of the most recent extremum of `values`, scanning backwards through the
/// sign of the first difference. Flat steps keep the direction seen after them.
fn last_turning_point(values: &[f64]) -> Option<usize> {
    let mut current: Option<f64> = None;
    for idx in (1..values.len()).rev() {
        let step = values[idx] - values[idx - 1];
        if step == 0.0 {
            continue;
        }
        let sign = step.signum();
        match current {
            None => current = Some(sign),
            Some(direction) if direction != sign => {
                // `idx` moved into the old direction; the extremum sits at its end.
                return Some(idx + flat_run_after(values, idx));
            }
            Some(_) => {}
        }
    }
    None
}

/// Number of flat steps directly after `idx`.
fn flat_run_after(values: &[f64], idx: usize) -> usize {
    values[idx + 1..]
        .iter()
        .zip(&values[idx..])
        .take_while(|(next, prev)| *next == *prev)
        .count()
}
