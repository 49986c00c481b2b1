//! Row sources: cursors that yield raw query results one row at a time

#[cfg(feature = "postgres")]
pub mod postgres;

use crate::error::{ExportError, Result};
use crate::types::{ColumnType, RawValue};
use std::collections::VecDeque;

/// A cursor over query results
///
/// Every row returned by [`RowSource::next_row`] holds exactly one value per
/// column reported by [`RowSource::columns`].
pub trait RowSource {
    /// Column descriptors, in result order
    fn columns(&self) -> &[ColumnType];

    /// Next row, or `None` once the results are exhausted
    fn next_row(&mut self) -> Result<Option<Vec<RawValue>>>;
}

impl<S: RowSource + ?Sized> RowSource for &mut S {
    fn columns(&self) -> &[ColumnType] {
        (**self).columns()
    }

    fn next_row(&mut self) -> Result<Option<Vec<RawValue>>> {
        (**self).next_row()
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn columns(&self) -> &[ColumnType] {
        (**self).columns()
    }

    fn next_row(&mut self) -> Result<Option<Vec<RawValue>>> {
        (**self).next_row()
    }
}

/// Row source backed by rows held in memory
///
/// # Examples
///
/// ```
/// use sqlsheet::source::{MemorySource, RowSource};
/// use sqlsheet::types::{ColumnType, RawValue};
///
/// let mut source = MemorySource::new(vec![ColumnType::new("name", "VARCHAR")]);
/// source.push_row(vec![RawValue::from("Alice")]).unwrap();
///
/// assert!(source.next_row().unwrap().is_some());
/// assert!(source.next_row().unwrap().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    columns: Vec<ColumnType>,
    rows: VecDeque<Vec<RawValue>>,
}

impl MemorySource {
    pub fn new(columns: Vec<ColumnType>) -> Self {
        MemorySource {
            columns,
            rows: VecDeque::new(),
        }
    }

    /// Build a source from columns and rows, checking every row's width
    pub fn with_rows<I>(columns: Vec<ColumnType>, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<RawValue>>,
    {
        let mut source = Self::new(columns);
        for row in rows {
            source.push_row(row)?;
        }
        Ok(source)
    }

    /// Append a row
    pub fn push_row(&mut self, row: Vec<RawValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ExportError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push_back(row);
        Ok(())
    }

    /// Rows not yet consumed
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowSource for MemorySource {
    fn columns(&self) -> &[ColumnType] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<RawValue>>> {
        Ok(self.rows.pop_front())
    }
}
