//! Spreadsheet output with streaming support
//!
//! Rows are written straight into the compressed file as they arrive, so
//! memory use does not grow with the number of rows.

use crate::error::Result;
use crate::xlsx::{StreamingWorkbook, DEFAULT_COMPRESSION_LEVEL};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// XLSX writer that streams string rows to disk
///
/// # Examples
///
/// ```no_run
/// use sqlsheet::writer::SheetWriter;
///
/// let mut writer = SheetWriter::new("output.xlsx").unwrap();
/// writer.write_header(["id", "name"]).unwrap();
/// writer.write_row(["1", "Alice"]).unwrap();
/// writer.save().unwrap();
/// ```
pub struct SheetWriter {
    inner: StreamingWorkbook<BufWriter<File>>,
    path: PathBuf,
    current_sheet_name: String,
}

impl SheetWriter {
    /// Create a writer with a single sheet named `Sheet1`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        SheetWriterBuilder::new(path).build()
    }

    /// Write a row of cell text
    ///
    /// Empty strings leave the cell empty.
    pub fn write_row<I, S>(&mut self, data: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.write_row(data)
    }

    /// Write multiple rows at once
    pub fn write_rows_batch<I, R, S>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for row_data in rows {
            self.write_row(row_data)?;
        }
        Ok(())
    }

    /// Write a header row
    pub fn write_header<I, S>(&mut self, headers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.write_row(headers)
    }

    /// Add a new sheet and switch to it
    pub fn add_sheet(&mut self, name: &str) -> Result<()> {
        self.inner.add_worksheet(name)?;
        self.current_sheet_name = name.to_string();
        Ok(())
    }

    /// Name of the sheet rows are currently written to
    pub fn current_sheet_name(&self) -> &str {
        &self.current_sheet_name
    }

    /// Rows written to the current sheet
    pub fn current_row(&self) -> u32 {
        self.inner.current_row()
    }

    /// Output file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finalize the workbook and flush it to disk
    pub fn save(self) -> Result<()> {
        let out = self.inner.close()?;
        out.into_inner()
            .map_err(|e| crate::error::ExportError::Io(e.into_error()))?
            .sync_all()?;
        log::debug!("saved workbook {}", self.path.display());
        Ok(())
    }
}

/// Builder for creating configured sheet writers
pub struct SheetWriterBuilder {
    path: PathBuf,
    sheet_name: Option<String>,
    compression_level: u32,
}

impl SheetWriterBuilder {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        SheetWriterBuilder {
            path: path.as_ref().to_path_buf(),
            sheet_name: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Set the name of the first sheet
    pub fn with_sheet_name(mut self, name: &str) -> Self {
        self.sheet_name = Some(name.to_string());
        self
    }

    /// Set the deflate level (0-9, clamped)
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Create the file and start the first sheet
    pub fn build(self) -> Result<SheetWriter> {
        let file = File::create(&self.path)?;
        let out = BufWriter::with_capacity(64 * 1024, file);
        let mut inner = StreamingWorkbook::new(out, self.compression_level);

        let sheet_name = self
            .sheet_name
            .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string());
        inner.add_worksheet(&sheet_name)?;

        Ok(SheetWriter {
            inner,
            path: self.path,
            current_sheet_name: sheet_name,
        })
    }
}
