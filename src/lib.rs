//! # sqlsheet
//!
//! Stream SQL query results into XLSX spreadsheets.
//!
//! ## Features
//!
//! - **Column formatting**: every driver value becomes spreadsheet text
//!   according to its declared column type (padded CHAR trimmed, timestamps
//!   rendered `YYYY-MM-DD HH:MM:SS`, BINARY as a number, UUIDs canonical)
//! - **Streaming write**: rows go straight into a deflated XLSX file, so
//!   memory stays flat for millions of rows
//! - **PostgreSQL source**: server-side cursor with fetch batching
//!   (`postgres` feature)
//! - **Seeding**: parallel multi-row INSERTs for load testing
//! - **Gzip**: compress a finished export
//!
//! ## Quick Start
//!
//! ### Formatting values
//!
//! ```rust
//! use sqlsheet::{ColumnFormatter, ColumnType, RawValue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let formatter = ColumnFormatter::new();
//! let column = ColumnType::new("code", "CHAR");
//!
//! assert_eq!(formatter.format(&column, &RawValue::from("A1   "))?, "A1");
//! assert_eq!(formatter.format(&column, &RawValue::Null)?, "");
//! # Ok(())
//! # }
//! ```
//!
//! ### Exporting rows
//!
//! ```rust,no_run
//! use sqlsheet::{ColumnType, ExportConfig, Exporter, MemorySource, RawValue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = MemorySource::with_rows(
//!     vec![ColumnType::new("id", "INT"), ColumnType::new("name", "VARCHAR")],
//!     vec![
//!         vec![RawValue::from("1"), RawValue::from("Alice")],
//!         vec![RawValue::from("2"), RawValue::Null],
//!     ],
//! )?;
//!
//! let config = ExportConfig::new("people.xlsx").with_header(true);
//! let summary = Exporter::new(config).export(source)?;
//! println!("{} rows in {:?}", summary.rows, summary.elapsed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod exporter;
pub mod formatter;
pub mod gzip;
pub mod seed;
pub mod source;
pub mod types;
pub mod writer;
pub mod xlsx;

pub use config::{ExportConfig, SeedConfig};
pub use error::{ExportError, Result};
pub use exporter::{ExportSummary, Exporter, RowFetcher};
pub use formatter::ColumnFormatter;
pub use seed::{Placeholder, Seeder, SqlExecutor, SqlParam};
pub use source::{MemorySource, RowSource};
pub use types::{ColumnType, RawValue, TypeClass};
pub use writer::{SheetWriter, SheetWriterBuilder};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_imports() {
        let _ = std::marker::PhantomData::<ExportError>;
        let _ = std::marker::PhantomData::<ColumnFormatter>;
        let _ = std::marker::PhantomData::<Exporter>;
        let _ = std::marker::PhantomData::<SheetWriter>;
    }
}
