use log::{info, warn};

use crate::analysis::global_trend::score_global_line;
use crate::analysis::local_trend::fit_local_line;
use crate::analysis::moving_average::detect_reversal;
use crate::analysis::peaks::PeakSet;
use crate::analysis::psychological::find_psychological_levels;
use crate::config::AnalysisParams;
use crate::data::{
    AnalysisResult, Candle, Detector, Diagnostic, LineRole, LineScope, Series, TrendLine,
};
use crate::error::AnalysisError;

/// Builds a series from raw candles and analyses it.
pub fn analyze_candles(
    candles: Vec<Candle>,
    params: &AnalysisParams,
) -> Result<AnalysisResult, AnalysisError> {
    let series = Series::new(candles)?;
    analyze(&series, params)
}

/// Runs every detector over `series`.
///
/// Only invalid parameters are returned as errors. A detector that finds
/// nothing leaves its field empty and adds a diagnostic naming the reason.
pub fn analyze(series: &Series, params: &AnalysisParams) -> Result<AnalysisResult, AnalysisError> {
    params.validate(series.len())?;
    let tolerance = params.resolve_tolerance(series);
    let regime = detect_reversal(&series.closes(), params.moving_average_window)?;

    let mut diagnostics = Vec::new();
    let peaks = PeakSet::from_series(series, params.peak_sensitivity);

    let mut line = |detector: Detector, scope: LineScope, role: LineRole| -> Option<TrendLine> {
        let outcome = peaks
            .as_ref()
            .map_err(|err| err.clone())
            .and_then(|peaks| match scope {
                LineScope::Local => {
                    fit_local_line(series, peaks, regime.working_window, role, tolerance)
                }
                LineScope::Global => score_global_line(
                    series,
                    peaks.of_kind(role.peak_kind()),
                    role,
                    tolerance,
                    params.min_touches,
                    &params.score_weights,
                ),
            });
        record(&mut diagnostics, detector, outcome)
    };
    let local_resistance = line(Detector::LocalResistance, LineScope::Local, LineRole::Resistance);
    let local_support = line(Detector::LocalSupport, LineScope::Local, LineRole::Support);
    let global_resistance =
        line(Detector::GlobalResistance, LineScope::Global, LineRole::Resistance);
    let global_support = line(Detector::GlobalSupport, LineScope::Global, LineRole::Support);

    let psychological_levels = record(
        &mut diagnostics,
        Detector::PsychologicalLevels,
        find_psychological_levels(series, params.psychological_level_count, tolerance),
    )
    .unwrap_or_default();

    info!(
        "analysed {} candles: {} trend lines, {} psychological levels, {} diagnostics",
        series.len(),
        [
            &local_resistance,
            &local_support,
            &global_resistance,
            &global_support
        ]
        .iter()
        .filter(|found| found.is_some())
        .count(),
        psychological_levels.len(),
        diagnostics.len()
    );

    Ok(AnalysisResult {
        local_resistance,
        local_support,
        global_resistance,
        global_support,
        psychological_levels,
        params: *params,
        tolerance,
        working_window: regime.working_window,
        moving_average: regime.moving_average,
        diagnostics,
    })
}

fn record<T>(
    diagnostics: &mut Vec<Diagnostic>,
    detector: Detector,
    outcome: Result<T, AnalysisError>,
) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(error) => {
            warn!("could not detect {detector}: {error}");
            diagnostics.push(Diagnostic { detector, error });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tolerance;
    use chrono::{TimeZone, Utc};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: Utc.timestamp_opt(i as i64 * 3600, 0).unwrap(),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: None,
            })
            .collect()
    }

    fn params() -> AnalysisParams {
        AnalysisParams {
            moving_average_window: 50,
            peak_sensitivity: 0.05,
            psychological_level_count: 5,
            tolerance: Tolerance::Absolute(0.5),
            ..AnalysisParams::default()
        }
    }

    #[test]
    fn malformed_series_is_fatal() {
        let mut raw = candles(&[1.0; 60]);
        raw[10].timestamp = raw[9].timestamp;
        let err = analyze_candles(raw, &params()).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData(_)));
        assert!(err.is_fatal());

        let err = analyze_candles(candles(&[1.0]), &params()).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData(_)));
    }

    #[test]
    fn missing_peaks_leave_lines_absent_with_diagnostics() {
        let closes: Vec<f64> = (0..80).map(|i| 50.0 + i as f64).collect();
        let result = analyze_candles(candles(&closes), &params()).unwrap();

        assert!(result.lines().next().is_none());
        for detector in [
            Detector::LocalResistance,
            Detector::LocalSupport,
            Detector::GlobalResistance,
            Detector::GlobalSupport,
        ] {
            let diagnostic = result.diagnostic_for(detector).unwrap();
            assert!(matches!(
                diagnostic.error,
                AnalysisError::InsufficientPeaks { .. }
            ));
        }
        assert!(!result.psychological_levels.is_empty());
        assert!(result.diagnostic_for(Detector::PsychologicalLevels).is_none());
    }

    #[test]
    fn result_carries_params_and_tolerance() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.4).sin() * 5.0).collect();
        let params = params();
        let result = analyze_candles(candles(&closes), &params).unwrap();
        assert_eq!(result.params, params);
        assert_eq!(result.tolerance, 0.5);
        assert_eq!(result.moving_average.len(), 31);
        assert_eq!(result.moving_average_at(48), None);
        assert!(result.moving_average_at(49).is_some());
        assert_eq!(result.working_window.end, 79);
    }
}
