//! CSV reading and the field-coercion ladder.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors reading a price-list table.
///
/// All of these are data problems, not infrastructure problems: the split
/// handler treats them as non-retryable validation failures.
#[derive(Debug, Error)]
pub enum TableError {
    /// Header row missing or all-blank.
    #[error("CSV file has no usable header row")]
    EmptyHeader,

    /// Structural CSV error (unclosed quote, bad UTF-8, ...).
    #[error("Malformed CSV: {0}")]
    Malformed(#[from] csv::Error),
}

/// A typed cell value.
///
/// Untagged on the wire, so rows serialize as plain JSON scalars. The
/// variant order matches the coercion ladder, which keeps deserialization
/// consistent with [`coerce_field`]: a value that round-trips through the
/// job store lands in the same variant it was coerced into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Fixed-point decimal, invariant `.` separator.
    Decimal(Decimal),
    /// ISO-8601 timestamp, normalized to UTC.
    Timestamp(DateTime<Utc>),
    /// `true`/`false`, any case.
    Bool(bool),
    /// Everything else, verbatim.
    Text(String),
}

/// Apply the coercion ladder to one raw field. First match wins:
/// decimal, timestamp, boolean, raw string. Empty fields are empty
/// strings. Deterministic: the same input always yields the same value.
pub fn coerce_field(raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::Text(String::new());
    }

    if let Ok(decimal) = Decimal::from_str(raw) {
        return CellValue::Decimal(decimal);
    }

    if let Some(timestamp) = parse_timestamp(raw) {
        return CellValue::Timestamp(timestamp);
    }

    match raw.to_ascii_lowercase().as_str() {
        "true" => CellValue::Bool(true),
        "false" => CellValue::Bool(false),
        _ => CellValue::Text(raw.to_string()),
    }
}

/// ISO-8601 forms accepted by the ladder: RFC 3339 with offset or `Z`,
/// local date-time (`T` or space separated), bare date.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }
    if let Ok(local) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&local));
    }
    if let Ok(local) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&local));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    None
}

/// A parsed price-list table.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    /// Column names from the header row.
    pub header: Vec<String>,
    /// Typed data rows, each padded to the header width.
    pub rows: Vec<Vec<CellValue>>,
}

/// Number of batches a row count yields at the given batch size.
pub fn batch_count(rows: usize, batch_size: usize) -> usize {
    rows.div_ceil(batch_size)
}

/// Parse CSV bytes into a typed table.
///
/// Tolerance: blank lines are skipped by the reader, short records are
/// padded with empty fields, and quoting (embedded commas, newlines,
/// `""`-escaped quotes) is handled per RFC 4180. A missing or all-blank
/// header row is an error.
pub fn parse_csv(bytes: &[u8]) -> Result<ParsedTable, TableError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if header.is_empty() || header.iter().all(|h| h.trim().is_empty()) {
        return Err(TableError::EmptyHeader);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Vec::with_capacity(header.len());
        for i in 0..header.len() {
            row.push(coerce_field(record.get(i).unwrap_or("")));
        }
        rows.push(row);
    }

    Ok(ParsedTable { header, rows })
}
