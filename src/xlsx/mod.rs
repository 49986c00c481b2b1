//! Streaming XLSX container
//!
//! This module provides the low-level pieces behind [`crate::writer::SheetWriter`]:
//! - A ZIP writer that deflates entries on-the-fly
//! - A workbook that streams worksheet XML straight into it

pub mod workbook;
pub mod zip_writer;

pub use workbook::{validate_sheet_name, StreamingWorkbook, MAX_COLUMNS, MAX_ROWS};
pub use zip_writer::StreamingZipWriter;

/// Default deflate level: balance between speed and size
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
