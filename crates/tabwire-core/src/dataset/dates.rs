//! Date column parsing for `put_instances`.
//!
//! Hosts send dates in whatever layout their data came in. Each requested
//! column is read as text and the first layout in [`DATE_LAYOUTS`] that
//! parses every non-missing cell wins. Month-first is tried before
//! day-first, so `03/04/2021` reads as March 4th.

use crate::{Result, WorkerError};
use arrow::array::{Array, StringArray, TimestampMillisecondArray};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// One way of reading a date cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateLayout {
    /// RFC 3339 with an offset, normalized to UTC.
    Rfc3339,
    /// Date and time, no offset.
    DateTime(&'static str),
    /// Date only, read as midnight.
    Date(&'static str),
}

/// Layouts in the order they are tried.
pub const DATE_LAYOUTS: &[DateLayout] = &[
    DateLayout::Rfc3339,
    DateLayout::DateTime("%Y-%m-%dT%H:%M:%S%.f"),
    DateLayout::DateTime("%Y-%m-%d %H:%M:%S%.f"),
    DateLayout::DateTime("%Y-%m-%dT%H:%M"),
    DateLayout::DateTime("%Y-%m-%d %H:%M"),
    DateLayout::DateTime("%Y/%m/%d %H:%M:%S"),
    DateLayout::DateTime("%m/%d/%Y %H:%M:%S"),
    DateLayout::DateTime("%d/%m/%Y %H:%M:%S"),
    DateLayout::DateTime("%m/%d/%Y %H:%M"),
    DateLayout::DateTime("%d/%m/%Y %H:%M"),
    DateLayout::DateTime("%d.%m.%Y %H:%M:%S"),
    DateLayout::Date("%Y-%m-%d"),
    DateLayout::Date("%Y/%m/%d"),
    DateLayout::Date("%m/%d/%Y"),
    DateLayout::Date("%d/%m/%Y"),
    DateLayout::Date("%d.%m.%Y"),
    DateLayout::Date("%d %b %Y"),
    DateLayout::Date("%b %d %Y"),
    DateLayout::Date("%B %d, %Y"),
    DateLayout::Date("%Y%m%d"),
];

impl DateLayout {
    pub fn parse(self, text: &str) -> Option<NaiveDateTime> {
        match self {
            DateLayout::Rfc3339 => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc()),
            DateLayout::DateTime(format) => NaiveDateTime::parse_from_str(text, format).ok(),
            DateLayout::Date(format) => NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0)),
        }
    }
}

/// First layout that reads every non-missing cell of `column`.
pub fn infer_layout(column: &StringArray) -> Option<DateLayout> {
    DATE_LAYOUTS.iter().copied().find(|layout| {
        column
            .iter()
            .flatten()
            .all(|text| layout.parse(text.trim()).is_some())
    })
}

/// Parse a text column into millisecond timestamps.
pub fn parse_date_column(name: &str, column: &StringArray) -> Result<TimestampMillisecondArray> {
    if column.null_count() == column.len() {
        return Ok(TimestampMillisecondArray::new_null(column.len()));
    }

    let layout = infer_layout(column).ok_or_else(|| {
        let sample = column.iter().flatten().next().unwrap_or_default();
        WorkerError::dataset(format!(
            "Unable to infer a date format for column {} (first value '{}')",
            name, sample
        ))
    })?;

    let millis: Vec<Option<i64>> = column
        .iter()
        .map(|cell| {
            cell.and_then(|text| layout.parse(text.trim()))
                .map(|dt| dt.and_utc().timestamp_millis())
        })
        .collect();
    Ok(TimestampMillisecondArray::from(millis))
}
