use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use trend_levels::analysis::analyze;
use trend_levels::config::AppConfig;
use trend_levels::data::Series;
use trend_levels::loader::{filter_period, load_candles_from_csv};
use trend_levels::output::{print_report, write_export, write_levels_export, ReportSections};

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = AppConfig::parse();
    run(&config)
}

fn run(config: &AppConfig) -> Result<()> {
    let input_path = &config.input_path;
    if !Path::new(input_path).exists() {
        bail!("input file {:?} does not exist", input_path);
    }

    let raw_candles = load_candles_from_csv(input_path, config.timezone)
        .with_context(|| format!("failed to load input data from {:?}", input_path))?;
    let candles = filter_period(&raw_candles, config.period);
    if candles.is_empty() {
        bail!("no candles remain after applying the {:?} look-back", config.period);
    }
    info!(
        "kept {} of {} candles for period {:?}",
        candles.len(),
        raw_candles.len(),
        config.period
    );

    let series = Series::new(candles).context("input series is not usable")?;
    let params = config.analysis_params();
    let result = analyze(&series, &params).context("analysis failed")?;

    let sections = ReportSections {
        local: !config.no_local,
        global: !config.no_global,
        levels: !config.no_levels,
    };
    print_report(&series, &result, config.timezone, sections);

    if let Some(path) = &config.export {
        write_export(path, &series, &result, config.timezone)?;
        info!("wrote per-candle analysis to {:?}", path);
    }
    if let Some(path) = &config.levels_export {
        write_levels_export(path, &result)?;
        info!("wrote psychological levels to {:?}", path);
    }

    Ok(())
}
