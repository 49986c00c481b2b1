//! Conversion of raw column values into spreadsheet cell text
//!
//! Each value is formatted according to the declared database type of its
//! column. The rules are intentionally narrow: they cover the type names the
//! export has to deal with and fall back to plain text for everything else.

use crate::error::{ExportError, Result};
use crate::types::{ColumnType, RawValue, TypeClass};
use chrono::{Datelike, NaiveDateTime, Timelike};
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Returns true for `0001-01-01 00:00:00`, the value some drivers hand out
/// for a zero date instead of NULL.
pub fn is_zero_timestamp(ts: &NaiveDateTime) -> bool {
    ts.year() == 1
        && ts.ordinal() == 1
        && ts.num_seconds_from_midnight() == 0
        && ts.nanosecond() == 0
}

/// Formats raw column values as cell strings
///
/// The formatter holds only configuration, so one instance can be shared
/// freely between threads.
///
/// # Examples
///
/// ```
/// use sqlsheet::formatter::ColumnFormatter;
/// use sqlsheet::types::{ColumnType, RawValue};
///
/// let formatter = ColumnFormatter::new();
/// let col = ColumnType::new("code", "CHAR");
/// let text = formatter.format(&col, &RawValue::from("abc  ")).unwrap();
/// assert_eq!(text, "abc");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnFormatter {
    null_placeholder: String,
}

impl ColumnFormatter {
    /// Create a formatter that renders NULL as an empty cell
    pub fn new() -> Self {
        Self::default()
    }

    /// Render NULL values as `placeholder` instead of an empty cell
    pub fn with_null_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.null_placeholder = placeholder.into();
        self
    }

    /// Text written for SQL NULL
    pub fn null_placeholder(&self) -> &str {
        &self.null_placeholder
    }

    /// Format one value of `column`
    ///
    /// Fails only when the payload does not match the declared type, which
    /// means the driver and the schema disagree.
    pub fn format(&self, column: &ColumnType, value: &RawValue) -> Result<String> {
        // SQL NULL, and the nullable-column fallback, both land here.
        if value.is_null() {
            return Ok(self.null_placeholder.clone());
        }

        let text = match column.class() {
            TypeClass::Character => {
                let bytes = expect_bytes(column, value)?;
                String::from_utf8_lossy(bytes).trim_end_matches(' ').to_string()
            }
            TypeClass::Temporal => {
                let ts = value
                    .as_timestamp()
                    .ok_or_else(|| mismatch(column, "a timestamp"))?;
                if is_zero_timestamp(&ts) {
                    String::new()
                } else {
                    ts.format(TIMESTAMP_FORMAT).to_string()
                }
            }
            TypeClass::FixedBinary => {
                let bytes = expect_bytes(column, value)?;
                let head: [u8; 8] = bytes
                    .get(..8)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| mismatch(column, "at least 8 bytes"))?;
                let mut buf = itoa::Buffer::new();
                buf.format(u64::from_be_bytes(head)).to_string()
            }
            TypeClass::UniqueIdentifier => {
                let bytes = expect_bytes(column, value)?;
                // Malformed identifiers become empty cells, not errors.
                Uuid::from_slice(bytes)
                    .map(|id| id.hyphenated().to_string())
                    .unwrap_or_default()
            }
            TypeClass::Numeric | TypeClass::Other => {
                let bytes = expect_bytes(column, value)?;
                String::from_utf8_lossy(bytes).into_owned()
            }
        };

        Ok(text)
    }

    /// Format a full row, one value per column
    pub fn format_row(&self, columns: &[ColumnType], values: &[RawValue]) -> Result<Vec<String>> {
        if columns.len() != values.len() {
            return Err(ExportError::RowWidth {
                expected: columns.len(),
                actual: values.len(),
            });
        }

        columns
            .iter()
            .zip(values)
            .map(|(column, value)| self.format(column, value))
            .collect()
    }
}

fn expect_bytes<'a>(column: &ColumnType, value: &'a RawValue) -> Result<&'a [u8]> {
    value.as_bytes().ok_or_else(|| mismatch(column, "a byte payload"))
}

fn mismatch(column: &ColumnType, expected: &'static str) -> ExportError {
    ExportError::ValueMismatch {
        column: column.name().to_string(),
        type_name: column.database_type_name().to_string(),
        expected,
    }
}
