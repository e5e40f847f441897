//! Forward-only result cursor

use crate::{ColumnMeta, Result, Row, SprocError};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// A forward-only cursor over the result sets produced by one execution.
///
/// Rows and result sets are consumed destructively; advancing past a row
/// or result set discards it and the cursor cannot be rewound.
#[async_trait]
pub trait ResultCursor: Send + std::fmt::Debug {
    /// Column metadata of the current result set
    fn columns(&self) -> &[ColumnMeta];

    /// Take the next row of the current result set, `None` when exhausted
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Advance to the next result set, discarding any unread rows of the
    /// current one. Returns `false` when no further result set exists.
    fn advance(&mut self) -> Result<bool>;

    /// Cancellable form of [`advance`](Self::advance). A token that fires
    /// before the wait completes surfaces [`SprocError::Cancelled`] and
    /// leaves the cursor untouched, so the same caller may retry.
    async fn advance_cancellable(&mut self, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(SprocError::Cancelled);
        }
        self.advance()
    }
}

/// One fully materialized result set
#[derive(Debug, Clone, Default)]
pub struct ResultSetBuffer {
    /// Column metadata
    pub columns: Vec<ColumnMeta>,
    /// Unread rows, in server order
    pub rows: VecDeque<Row>,
}

impl ResultSetBuffer {
    /// Create a buffer from columns and rows
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }
}

/// In-memory [`ResultCursor`] over pre-fetched result sets.
///
/// Drivers that materialize the server response wrap their result sets in
/// this cursor; test doubles use it the same way.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    sets: VecDeque<ResultSetBuffer>,
}

impl BufferedCursor {
    /// Cursor over the given result sets, positioned on the first
    pub fn new(sets: Vec<ResultSetBuffer>) -> Self {
        Self { sets: sets.into() }
    }

    /// Cursor over a single result set
    pub fn single(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self::new(vec![ResultSetBuffer::new(columns, rows)])
    }
}

#[async_trait]
impl ResultCursor for BufferedCursor {
    fn columns(&self) -> &[ColumnMeta] {
        self.sets
            .front()
            .map(|set| set.columns.as_slice())
            .unwrap_or(&[])
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.sets.front_mut().and_then(|set| set.rows.pop_front()))
    }

    fn advance(&mut self) -> Result<bool> {
        self.sets.pop_front();
        Ok(!self.sets.is_empty())
    }
}
