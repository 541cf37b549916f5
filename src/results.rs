use std::sync::Arc;

use crate::driver::RawResult;
use crate::field::{Field, FieldMetadata};
use crate::types::SqlValue;

/// Borrowed view of one materialized row.
///
/// The lifetime says where the cells live: a `Row` from
/// [`QueryResultSet::current`] dies at the next [`QueryResultSet::next_row`]
/// call (the buffer is reused), while a `Row` from
/// [`PreparedQueryResultSet::row`] stays valid for the whole result set.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    cells: &'a [SqlValue],
    meta: &'a [FieldMetadata],
}

impl<'a> Row<'a> {
    /// Typed accessor for the cell at `index`.
    ///
    /// # Panics
    /// Panics when `index` is out of range.
    #[must_use]
    pub fn field(&self, index: usize) -> Field<'a> {
        assert!(
            index < self.cells.len(),
            "field index {index} out of range ({} fields)",
            self.cells.len()
        );
        Field::new(&self.cells[index], &self.meta[index])
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.cells.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = Field<'a>> + '_ {
        self.cells
            .iter()
            .zip(self.meta.iter())
            .map(|(value, meta)| Field::new(value, meta))
    }
}

/// Result of a raw-SQL (text protocol) query.
///
/// Rows are consumed forward-only through one reused current-row buffer:
/// `next_row` overwrites it, so a row's fields must be read before
/// advancing. The borrow checker enforces this: a [`Row`] borrowed from
/// [`current`](Self::current) cannot outlive the next `next_row` call.
///
/// Not positioned on any row until the first successful `next_row`.
#[derive(Debug, Clone)]
pub struct QueryResultSet {
    meta: Arc<[FieldMetadata]>,
    pending: std::vec::IntoIter<Vec<SqlValue>>,
    current: Vec<SqlValue>,
    positioned: bool,
    row_count: u64,
    field_count: u32,
}

impl QueryResultSet {
    pub(crate) fn new(raw: RawResult) -> Self {
        let row_count = raw.rows.len() as u64;
        let field_count = raw.columns.len() as u32;
        Self {
            meta: raw.columns.into(),
            pending: raw.rows.into_iter(),
            current: Vec::new(),
            positioned: false,
            row_count,
            field_count,
        }
    }

    /// Advance to the next row, overwriting the current-row buffer.
    /// Returns false once the rows are exhausted.
    pub fn next_row(&mut self) -> bool {
        match self.pending.next() {
            Some(row) => {
                self.current = row;
                self.positioned = true;
                true
            }
            None => {
                self.current.clear();
                self.positioned = false;
                false
            }
        }
    }

    /// The row the set is currently positioned on.
    #[must_use]
    pub fn current(&self) -> Option<Row<'_>> {
        self.positioned.then(|| Row {
            cells: &self.current,
            meta: &self.meta,
        })
    }

    /// Field `index` of the current row.
    ///
    /// # Panics
    /// Panics when not positioned on a row or when `index` is out of range.
    #[must_use]
    pub fn field(&self, index: usize) -> Field<'_> {
        self.current()
            .expect("no current row; call next_row first")
            .field(index)
    }

    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    #[must_use]
    pub fn field_count(&self) -> u32 {
        self.field_count
    }

    #[must_use]
    pub fn metadata(&self) -> &[FieldMetadata] {
        &self.meta
    }
}

/// Result of a prepared-statement (binary protocol) query.
///
/// Every row is pulled into one flat buffer up front
/// (`row * field_count + col` addressing), so a [`Row`] obtained from
/// [`row`](Self::row) stays valid for the result set's whole lifetime and
/// [`next_row`](Self::next_row) is a pure position increment with no I/O.
///
/// Positioned on the first row at construction.
#[derive(Debug, Clone)]
pub struct PreparedQueryResultSet {
    meta: Arc<[FieldMetadata]>,
    cells: Vec<SqlValue>,
    row_count: u64,
    field_count: u32,
    position: u64,
}

impl PreparedQueryResultSet {
    pub(crate) fn new(raw: RawResult) -> Self {
        let row_count = raw.rows.len() as u64;
        let field_count = raw.columns.len() as u32;
        let mut cells = Vec::with_capacity(raw.rows.len() * raw.columns.len());
        for row in raw.rows {
            cells.extend(row);
        }
        Self {
            meta: raw.columns.into(),
            cells,
            row_count,
            field_count,
            position: 0,
        }
    }

    /// Advance the row position. Returns false once past the last row.
    pub fn next_row(&mut self) -> bool {
        self.position += 1;
        self.position < self.row_count
    }

    /// The row at the current position.
    #[must_use]
    pub fn current(&self) -> Option<Row<'_>> {
        self.row(self.position)
    }

    /// The row at `index`; the returned [`Row`] is valid for the result
    /// set's whole lifetime.
    #[must_use]
    pub fn row(&self, index: u64) -> Option<Row<'_>> {
        if index >= self.row_count {
            return None;
        }
        let width = self.field_count as usize;
        let start = usize::try_from(index).ok()? * width;
        Some(Row {
            cells: &self.cells[start..start + width],
            meta: &self.meta,
        })
    }

    /// Iterate every row from the start, independent of the current
    /// position.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.row_count).filter_map(|index| self.row(index))
    }

    /// Field `index` of the current row.
    ///
    /// # Panics
    /// Panics when positioned past the last row or when `index` is out of
    /// range.
    #[must_use]
    pub fn field(&self, index: usize) -> Field<'_> {
        self.current()
            .expect("row position past the end of the result set")
            .field(index)
    }

    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    #[must_use]
    pub fn field_count(&self) -> u32 {
        self.field_count
    }

    #[must_use]
    pub fn metadata(&self) -> &[FieldMetadata] {
        &self.meta
    }
}
