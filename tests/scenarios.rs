use chrono::{TimeZone, Utc};

use trend_levels::config::{AnalysisParams, Tolerance};
use trend_levels::data::{Candle, Detector, IndexSpan};
use trend_levels::{analyze, analyze_candles, AnalysisError, Series};

fn candle(index: usize, close: f64, spread: f64) -> Candle {
    Candle {
        timestamp: Utc
            .timestamp_opt(1_600_000_000 + index as i64 * 86_400, 0)
            .unwrap(),
        open: close,
        high: close + spread,
        low: close - spread,
        close,
        volume: Some(1_000.0),
    }
}

/// Rising closes with a pull-back every tenth candle (at i = 5, 15, ...).
fn uptrend() -> Vec<Candle> {
    (0..100)
        .map(|i| {
            let dip = if i % 10 == 5 { 6.0 } else { 0.0 };
            candle(i, 100.0 + 0.5 * i as f64 - dip, 0.2)
        })
        .collect()
}

fn params(window: usize) -> AnalysisParams {
    AnalysisParams {
        moving_average_window: window,
        peak_sensitivity: 0.05,
        ..AnalysisParams::default()
    }
}

#[test]
fn uptrend_yields_rising_support_through_the_pullbacks() {
    let result = analyze_candles(uptrend(), &params(50)).unwrap();

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.working_window, IndexSpan::new(0, 99));

    let local = result.local_support.as_ref().unwrap();
    assert!((local.slope() - 0.5).abs() < 1e-9);
    assert_eq!(local.touch_count, 10);
    assert_eq!(local.coverage, IndexSpan::new(5, 99));
    assert!((local.value_at(5) - 96.3).abs() < 1e-9);

    let global = result.global_support.as_ref().unwrap();
    assert_eq!((global.first.index, global.second.index), (5, 95));
    assert_eq!(global.touch_count, 10);
    assert!((global.slope() - 0.5).abs() < 1e-9);

    for line in [&result.local_resistance, &result.global_resistance] {
        let line = line.as_ref().unwrap();
        assert!((line.slope() - 0.5).abs() < 1e-9);
        assert!(line.touch_count >= 9);
    }
}

#[test]
fn global_resistance_is_never_broken_inside_its_span() {
    let series = Series::new(uptrend()).unwrap();
    let result = analyze(&series, &params(50)).unwrap();
    let line = result.global_resistance.as_ref().unwrap();

    for index in line.coverage.start..=line.coverage.end {
        let high = series.get(index).unwrap().high;
        assert!(high - line.value_at(index) <= result.tolerance + 1e-9);
    }
    assert!(line.touch_count >= result.params.min_touches);
}

#[test]
fn flat_series_reports_a_single_level() {
    let candles: Vec<Candle> = (0..60).map(|i| candle(i, 100.0, 0.0)).collect();
    let result = analyze_candles(candles, &params(50)).unwrap();

    assert!(result.lines().next().is_none());
    assert!(matches!(
        result.diagnostic_for(Detector::GlobalSupport).map(|d| &d.error),
        Some(AnalysisError::InsufficientPeaks {
            maxima: 0,
            minima: 0
        })
    ));
    assert_eq!(result.psychological_levels.len(), 1);
    assert_eq!(result.psychological_levels[0].price, 100.0);
    assert_eq!(result.psychological_levels[0].touch_count, 60);
    assert!((result.tolerance - 1.0).abs() < 1e-12);
}

#[test]
fn window_longer_than_the_series_is_rejected() {
    let candles: Vec<Candle> = (0..30).map(|i| candle(i, 100.0 + i as f64, 0.5)).collect();
    let err = analyze_candles(candles, &params(50)).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::InvalidParameter {
            name: "moving_average_window",
            ..
        }
    ));
}

#[test]
fn out_of_range_parameters_are_rejected() {
    let series = Series::new(uptrend()).unwrap();
    let bad = [
        AnalysisParams {
            peak_sensitivity: 0.9,
            ..params(50)
        },
        AnalysisParams {
            psychological_level_count: 40,
            ..params(50)
        },
        AnalysisParams {
            tolerance: Tolerance::Absolute(-1.0),
            ..params(50)
        },
    ];
    for params in bad {
        assert!(analyze(&series, &params).unwrap_err().is_fatal());
    }
}

#[test]
fn repeated_runs_are_identical() {
    let candles: Vec<Candle> = (0..300)
        .map(|i| {
            let x = i as f64;
            let close = 200.0 + 15.0 * (x * 0.07).sin() + 4.0 * (x * 0.31).cos() + 0.05 * x;
            candle(i, close, 1.0 + (x * 0.5).sin().abs())
        })
        .collect();
    let series = Series::new(candles).unwrap();
    let params = AnalysisParams {
        moving_average_window: 60,
        peak_sensitivity: 0.05,
        ..AnalysisParams::default()
    };

    let first = analyze(&series, &params).unwrap();
    for _ in 0..3 {
        assert_eq!(analyze(&series, &params).unwrap(), first);
    }
}
