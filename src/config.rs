//! Export and seeding configuration
//!
//! Both configs are plain structs with builder-style setters. `from_env`
//! reads overrides from `SQLSHEET_*` environment variables.

use crate::error::{ExportError, Result};
use crate::formatter::ColumnFormatter;
use crate::seed::{Placeholder, SampleRecord};
use crate::xlsx::DEFAULT_COMPRESSION_LEVEL;
use std::path::PathBuf;
use std::str::FromStr;

/// Settings for one export run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExportConfig {
    /// Output `.xlsx` path
    pub output_path: PathBuf,
    /// Name of the sheet rows are written to
    pub sheet_name: String,
    /// Stop after this many data rows; 0 means no limit
    pub max_rows: u64,
    /// Text written for SQL NULL
    pub null_placeholder: String,
    /// Write column names as the first row
    pub include_header: bool,
    /// Deflate level 0-9
    pub compression_level: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            output_path: PathBuf::from("export.xlsx"),
            sheet_name: "Sheet1".to_string(),
            max_rows: 0,
            null_placeholder: String::new(),
            include_header: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl ExportConfig {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        ExportConfig {
            output_path: output_path.into(),
            ..Self::default()
        }
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_null_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.null_placeholder = placeholder.into();
        self
    }

    pub fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Apply overrides from the environment
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `SQLSHEET_OUTPUT` | `output_path` |
    /// | `SQLSHEET_SHEET` | `sheet_name` |
    /// | `SQLSHEET_MAX_ROWS` | `max_rows` |
    /// | `SQLSHEET_NULL` | `null_placeholder` |
    /// | `SQLSHEET_HEADER` | `include_header` |
    /// | `SQLSHEET_COMPRESSION` | `compression_level` |
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("SQLSHEET_OUTPUT") {
            self.output_path = PathBuf::from(path);
        }
        if let Some(sheet) = lookup("SQLSHEET_SHEET") {
            self.sheet_name = sheet;
        }
        if let Some(v) = lookup("SQLSHEET_MAX_ROWS") {
            self.max_rows = parse_var("SQLSHEET_MAX_ROWS", &v)?;
        }
        if let Some(v) = lookup("SQLSHEET_NULL") {
            self.null_placeholder = v;
        }
        if let Some(v) = lookup("SQLSHEET_HEADER") {
            self.include_header = parse_bool("SQLSHEET_HEADER", &v)?;
        }
        if let Some(v) = lookup("SQLSHEET_COMPRESSION") {
            self.compression_level = parse_var("SQLSHEET_COMPRESSION", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(ExportError::Config(format!(
                "compression level must be 0-9, got {}",
                self.compression_level
            )));
        }
        crate::xlsx::validate_sheet_name(&self.sheet_name)
            .map_err(|e| ExportError::Config(e.to_string()))
    }

    /// Formatter configured with this export's null placeholder
    pub fn formatter(&self) -> ColumnFormatter {
        ColumnFormatter::new().with_null_placeholder(self.null_placeholder.clone())
    }
}

/// Settings for a seeding run
#[derive(Debug, Clone)]
pub struct SeedConfig {
    /// Target table
    pub table: String,
    /// Number of INSERT statements to run
    pub batches: usize,
    /// Rows per INSERT statement
    pub rows_per_batch: usize,
    /// Concurrent workers
    pub workers: usize,
    /// Placeholder style of the target database
    pub placeholder: Placeholder,
    /// Row inserted repeatedly
    pub record: SampleRecord,
}

impl Default for SeedConfig {
    fn default() -> Self {
        SeedConfig {
            table: "logs".to_string(),
            batches: 10_000,
            rows_per_batch: 20,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            placeholder: Placeholder::Question,
            record: SampleRecord::default(),
        }
    }
}

impl SeedConfig {
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_batches(mut self, batches: usize, rows_per_batch: usize) -> Self {
        self.batches = batches;
        self.rows_per_batch = rows_per_batch;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn with_record(mut self, record: SampleRecord) -> Self {
        self.record = record;
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.rows_per_batch == 0 {
            return Err(ExportError::Config("rows per batch must be positive".to_string()));
        }
        if self.workers == 0 {
            return Err(ExportError::Config("worker count must be positive".to_string()));
        }
        if self.table.is_empty() {
            return Err(ExportError::Config("table name is empty".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ExportError::Config(format!("{}: cannot parse '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ExportError::Config(format!(
            "{}: expected a boolean, got '{}'",
            key, value
        ))),
    }
}
