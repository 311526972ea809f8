//! Row cursor over a connected table.

use std::fmt;

use thiserror::Error;

/// Position of a [`TableIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    BeforeFirst,
    Positioned(usize),
    Exhausted,
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::BeforeFirst => write!(f, "before the first row"),
            Cursor::Positioned(index) => write!(f, "at row {index}"),
            Cursor::Exhausted => write!(f, "past the last row"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("no current row: the cursor is {0}")]
    NoCurrentRow(Cursor),
}

/// Walks the row indices of a table of known length.
///
/// Once exhausted the iterator keeps returning `None` until it is rewound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIterator {
    row_count: usize,
    cursor: Cursor,
}

impl TableIterator {
    pub fn new(row_count: usize) -> Self {
        Self {
            row_count,
            cursor: Cursor::BeforeFirst,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Index of the current row.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::NoCurrentRow`] before the first row and after the last.
    pub fn current(&self) -> Result<usize, CursorError> {
        match self.cursor {
            Cursor::Positioned(index) => Ok(index),
            other => Err(CursorError::NoCurrentRow(other)),
        }
    }

    /// Return to the position before the first row.
    pub fn rewind(&mut self) {
        self.cursor = Cursor::BeforeFirst;
    }
}

impl Iterator for TableIterator {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.cursor {
            Cursor::BeforeFirst => 0,
            Cursor::Positioned(index) => index + 1,
            Cursor::Exhausted => return None,
        };
        if next < self.row_count {
            self.cursor = Cursor::Positioned(next);
            Some(next)
        } else {
            self.cursor = Cursor::Exhausted;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walks_every_row_then_exhausts() {
        let mut iterator = TableIterator::new(2);
        assert_eq!(iterator.cursor(), Cursor::BeforeFirst);
        assert_eq!(iterator.next(), Some(0));
        assert_eq!(iterator.current(), Ok(0));
        assert_eq!(iterator.next(), Some(1));
        assert_eq!(iterator.next(), None);
        assert_eq!(iterator.cursor(), Cursor::Exhausted);
        assert_eq!(iterator.next(), None);
    }

    #[test]
    fn test_no_current_row() {
        let mut iterator = TableIterator::new(1);
        assert_eq!(
            iterator.current(),
            Err(CursorError::NoCurrentRow(Cursor::BeforeFirst))
        );
        iterator.by_ref().for_each(drop);
        let err = iterator.current().unwrap_err();
        assert_eq!(err.to_string(), "no current row: the cursor is past the last row");
    }

    #[test]
    fn test_empty_table() {
        let mut iterator = TableIterator::new(0);
        assert_eq!(iterator.next(), None);
        assert_eq!(iterator.cursor(), Cursor::Exhausted);
    }

    #[test]
    fn test_rewind() {
        let mut iterator = TableIterator::new(3);
        iterator.next();
        iterator.next();
        iterator.rewind();
        assert_eq!(iterator.cursor(), Cursor::BeforeFirst);
        assert_eq!(iterator.next(), Some(0));
    }
}
