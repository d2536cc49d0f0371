use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use csv::StringRecord;
use log::{debug, warn};
use thiserror::Error;

use crate::config::LookbackPeriod;
use crate::data::Candle;

/// Accepted names for the time column, matched case-insensitively in this order.
pub const TIME_COLUMN_ALIASES: [&str; 4] = ["open_time", "datetime", "date", "timestamp"];

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("input file contains no valid rows")]
    Empty,

    #[error("no time column found (expected one of: open_time, datetime, date, timestamp)")]
    MissingTimeColumn,

    #[error("missing required price column '{0}'")]
    MissingColumn(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, LoaderError> {
        let lowered: Vec<String> = headers
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();
        let find = |name: &str| lowered.iter().position(|h| h == name);

        let time = TIME_COLUMN_ALIASES
            .iter()
            .find_map(|alias| find(*alias))
            .ok_or(LoaderError::MissingTimeColumn)?;
        let required = |name: &'static str| find(name).ok_or(LoaderError::MissingColumn(name));

        Ok(Self {
            time,
            open: required("open")?,
            high: required("high")?,
            low: required("low")?,
            close: required("close")?,
            volume: find("volume"),
        })
    }
}

/// Loads candles from a CSV file with a header row. Naive timestamps are read
/// in `tz`.
pub fn load_candles_from_csv<P: AsRef<Path>>(path: P, tz: Tz) -> Result<Vec<Candle>> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref).with_context(|| format!("failed to open {:?}", path_ref))?;
    read_candles(file, tz).with_context(|| format!("failed to parse {:?}", path_ref))
}

/// Reads candles from any CSV source, sorted ascending with unique timestamps.
///
/// Rows with an unreadable time or price are skipped.
pub fn read_candles<R: Read>(source: R, tz: Tz) -> Result<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source);

    let columns = ColumnMap::from_headers(reader.headers()?)?;

    let mut candles = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        match parse_record(&record, &columns, tz) {
            Some(candle) => candles.push(candle),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("skipped {skipped} rows with a missing or unreadable time or price");
    }

    if candles.is_empty() {
        return Err(LoaderError::Empty.into());
    }

    candles.sort_by_key(|candle| candle.timestamp);
    let before = candles.len();
    candles.dedup_by_key(|candle| candle.timestamp);
    if candles.len() < before {
        warn!(
            "dropped {} rows with duplicate timestamps",
            before - candles.len()
        );
    }
    debug!("loaded {} candles", candles.len());
    Ok(candles)
}

fn parse_record(record: &StringRecord, columns: &ColumnMap, tz: Tz) -> Option<Candle> {
    let timestamp = parse_timestamp(record.get(columns.time)?, tz)?;
    let open = parse_number(record.get(columns.open))?;
    let high = parse_number(record.get(columns.high))?;
    let low = parse_number(record.get(columns.low))?;
    let close = parse_number(record.get(columns.close))?;
    let volume = columns
        .volume
        .and_then(|idx| parse_number(record.get(idx)));

    Some(Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    })
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    value
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

/// Parses epoch seconds or milliseconds, RFC 3339, offset-qualified or naive
/// datetimes, and plain dates (midnight in `tz`).
pub fn parse_timestamp(value: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(epoch) = trimmed.parse::<f64>() {
        return parse_epoch(epoch);
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime.with_timezone(&Utc));
    }

    let offset_patterns = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];
    for pattern in &offset_patterns {
        if let Ok(datetime) = DateTime::parse_from_str(trimmed, pattern) {
            return Some(datetime.with_timezone(&Utc));
        }
    }

    let patterns = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    for pattern in &patterns {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return Some(localize(datetime, tz));
        }
    }

    let date_patterns = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
    for pattern in &date_patterns {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, pattern) {
            return date.and_hms_opt(0, 0, 0).map(|dt| localize(dt, tz));
        }
    }

    None
}

fn parse_epoch(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }
    // Values this large only make sense as milliseconds.
    let millis = if epoch.abs() >= 1e11 { epoch } else { epoch * 1000.0 };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

fn localize(datetime: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    let local = match tz.from_local_datetime(&datetime) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => tz.from_utc_datetime(&datetime),
    };
    local.with_timezone(&Utc)
}

/// Keeps the candles within `period` of the last one.
pub fn filter_period(candles: &[Candle], period: LookbackPeriod) -> Vec<Candle> {
    let Some(last) = candles.last() else {
        return Vec::new();
    };
    match period.cutoff(last.timestamp) {
        Some(cutoff) => candles
            .iter()
            .filter(|candle| candle.timestamp >= cutoff)
            .cloned()
            .collect(),
        None => candles.to_vec(),
    }
}
