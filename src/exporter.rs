//! Query-to-spreadsheet export
//!
//! [`RowFetcher`] turns a [`RowSource`] into formatted string rows and
//! enforces the row limit; [`Exporter`] streams those rows into an XLSX
//! file.

use crate::config::ExportConfig;
use crate::error::Result;
use crate::formatter::ColumnFormatter;
use crate::source::RowSource;
use crate::types::ColumnType;
use crate::writer::SheetWriterBuilder;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const PROGRESS_INTERVAL: u64 = 100_000;

/// Pulls rows from a source and formats every cell
pub struct RowFetcher<S> {
    source: S,
    formatter: ColumnFormatter,
    max_rows: u64,
    fetched: u64,
}

impl<S: RowSource> RowFetcher<S> {
    /// `max_rows == 0` means no limit
    pub fn new(source: S, formatter: ColumnFormatter, max_rows: u64) -> Self {
        RowFetcher {
            source,
            formatter,
            max_rows,
            fetched: 0,
        }
    }

    /// Next formatted row, or `None` when the source is exhausted or the
    /// row limit is reached
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        if self.max_rows > 0 && self.fetched >= self.max_rows {
            return Ok(None);
        }

        let Some(values) = self.source.next_row()? else {
            return Ok(None);
        };
        let row = self.formatter.format_row(self.source.columns(), &values)?;
        self.fetched += 1;
        Ok(Some(row))
    }

    /// Column descriptors of the underlying source
    pub fn columns(&self) -> &[ColumnType] {
        self.source.columns()
    }

    /// Rows returned so far
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Give back the source, positioned after the last fetched row
    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: RowSource> Iterator for RowFetcher<S> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// Outcome of an export run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Data rows written, excluding the header
    pub rows: u64,
    /// File the rows were written to
    pub path: PathBuf,
    /// Wall-clock time of the whole run
    pub elapsed: Duration,
}

/// Streams query results into a single-sheet XLSX file
///
/// # Examples
///
/// ```no_run
/// use sqlsheet::config::ExportConfig;
/// use sqlsheet::exporter::Exporter;
/// use sqlsheet::source::MemorySource;
/// use sqlsheet::types::{ColumnType, RawValue};
///
/// let source = MemorySource::with_rows(
///     vec![ColumnType::new("code", "CHAR")],
///     vec![vec![RawValue::from("A1  ")]],
/// )?;
/// let summary = Exporter::new(ExportConfig::new("codes.xlsx")).export(source)?;
/// assert_eq!(summary.rows, 1);
/// # Ok::<(), sqlsheet::ExportError>(())
/// ```
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    /// Create an exporter; the config is validated on each export
    pub fn new(config: ExportConfig) -> Self {
        Exporter { config }
    }

    /// Settings used for every export
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export every row of `source`, up to the configured limit
    ///
    /// The first formatting or source error aborts the run; the partially
    /// written file is left unfinished.
    pub fn export<S: RowSource>(&self, source: S) -> Result<ExportSummary> {
        self.config.validate()?;

        let start = Instant::now();
        let path = self.config.output_path.clone();
        log::info!("exporting to {}", path.display());

        let mut writer = SheetWriterBuilder::new(&path)
            .with_sheet_name(&self.config.sheet_name)
            .with_compression_level(self.config.compression_level)
            .build()?;

        let mut fetcher = RowFetcher::new(source, self.config.formatter(), self.config.max_rows);

        if self.config.include_header {
            writer.write_header(fetcher.columns().iter().map(ColumnType::name))?;
        }

        while let Some(row) = fetcher.next_row()? {
            writer.write_row(&row)?;
            if fetcher.fetched() % PROGRESS_INTERVAL == 0 {
                log::info!(
                    "{} rows exported ({:.0} rows/sec)",
                    fetcher.fetched(),
                    fetcher.fetched() as f64 / start.elapsed().as_secs_f64()
                );
            }
        }

        let rows = fetcher.fetched();
        writer.save()?;

        let elapsed = start.elapsed();
        log::info!(
            "exported {} rows to {} in {:.2}s",
            rows,
            path.display(),
            elapsed.as_secs_f64()
        );

        Ok(ExportSummary {
            rows,
            path,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::source::MemorySource;
    use crate::types::RawValue;
    use tempfile::tempdir;

    fn numbered_source(n: usize) -> MemorySource {
        MemorySource::with_rows(
            vec![ColumnType::new("id", "INT"), ColumnType::new("code", "CHAR")],
            (0..n).map(|i| vec![RawValue::from(i.to_string()), RawValue::from("x  ")]),
        )
        .unwrap()
    }

    #[test]
    fn test_fetcher_formats_rows() {
        let mut fetcher = RowFetcher::new(numbered_source(1), ColumnFormatter::new(), 0);
        assert_eq!(
            fetcher.next_row().unwrap(),
            Some(vec!["0".to_string(), "x".to_string()])
        );
        assert_eq!(fetcher.next_row().unwrap(), None);
        assert_eq!(fetcher.fetched(), 1);
    }

    #[test]
    fn test_fetcher_row_limit() {
        let fetcher = RowFetcher::new(numbered_source(5), ColumnFormatter::new(), 2);
        let rows: Vec<_> = fetcher.collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_fetcher_unlimited() {
        let fetcher = RowFetcher::new(numbered_source(7), ColumnFormatter::new(), 0);
        assert_eq!(fetcher.count(), 7);
    }

    #[test]
    fn test_fetcher_leaves_rest_of_source() {
        let mut fetcher = RowFetcher::new(numbered_source(5), ColumnFormatter::new(), 3);
        while fetcher.next_row().unwrap().is_some() {}
        assert_eq!(fetcher.into_inner().remaining(), 2);
    }

    #[test]
    fn test_export_writes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let config = ExportConfig::new(&path).with_header(true).with_max_rows(3);
        let summary = Exporter::new(config).export(numbered_source(10)).unwrap();

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.path, path);
        assert!(path.exists());
    }

    #[test]
    fn test_export_aborts_on_mismatch() {
        let dir = tempdir().unwrap();
        let source = MemorySource::with_rows(
            vec![ColumnType::new("created_at", "DATETIME")],
            vec![vec![RawValue::from("2024-01-01")]],
        )
        .unwrap();

        let err = Exporter::new(ExportConfig::new(dir.path().join("bad.xlsx")))
            .export(source)
            .unwrap_err();
        assert!(matches!(err, ExportError::ValueMismatch { .. }));
    }
}
