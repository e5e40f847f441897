//! Typed result reading over a live cursor

use sproc_core::{ColumnMeta, FieldBinding, FromValue, Result, ResultCursor, RowTarget, SprocError};
use tokio_util::sync::CancellationToken;

/// Reads the result sets of one execution into typed records or scalars.
///
/// Wraps the forward-only cursor handed out by the executor. Every read
/// consumes cursor state destructively; nothing can be replayed.
pub struct ProcReader {
    cursor: Box<dyn ResultCursor>,
}

impl ProcReader {
    /// Wrap a live cursor
    pub fn new(cursor: Box<dyn ResultCursor>) -> Self {
        Self { cursor }
    }

    /// Column metadata of the current result set
    pub fn columns(&self) -> &[ColumnMeta] {
        self.cursor.columns()
    }

    /// Materialize the current result set into records, in row order.
    ///
    /// Columns are matched to `T`'s binding table by case-insensitive name
    /// equality, computed once per call. Columns without a binding and
    /// bindings without a column are ignored; NULL cells leave the field at
    /// its default. Consumes every row of the current result set.
    pub fn map_rows<T: RowTarget + 'static>(&mut self) -> Result<Vec<T>> {
        let bindings = T::field_bindings();
        let matched: Vec<(usize, &FieldBinding<T>)> = self
            .cursor
            .columns()
            .iter()
            .enumerate()
            .filter_map(|(index, column)| {
                bindings
                    .iter()
                    .find(|binding| binding.column.eq_ignore_ascii_case(&column.name))
                    .map(|binding| (index, binding))
            })
            .collect();

        let mut records = Vec::new();
        while let Some(row) = self.cursor.next_row()? {
            let mut record = T::default();
            for (index, binding) in &matched {
                if let Some(value) = row.get(*index) {
                    if !value.is_null() {
                        (binding.assign)(&mut record, value.clone());
                    }
                }
            }
            records.push(record);
        }

        tracing::debug!(rows = records.len(), "materialized result set");
        Ok(records)
    }

    /// Read row 0, column 0 of the current result set as a scalar.
    ///
    /// Returns `None` when the result set is empty or the cell is NULL.
    /// Rows past the first are left unread on the cursor.
    pub fn scalar<T: FromValue>(&mut self) -> Result<Option<T>> {
        let Some(row) = self.cursor.next_row()? else {
            return Ok(None);
        };
        let Some(value) = row.values.into_iter().next() else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }

        let display = value.to_string();
        match T::from_value(value) {
            Some(scalar) => Ok(Some(scalar)),
            None => Err(SprocError::TypeConversion(format!(
                "value '{}' cannot be read as {}",
                display,
                std::any::type_name::<T>()
            ))),
        }
    }

    /// Advance to the next result set; `false` when none remains
    pub fn advance(&mut self) -> Result<bool> {
        self.cursor.advance()
    }

    /// Cancellable form of [`advance`](Self::advance); a token firing
    /// before completion surfaces [`SprocError::Cancelled`] and the cursor
    /// stays usable for a retry
    pub async fn advance_cancellable(&mut self, cancel: &CancellationToken) -> Result<bool> {
        self.cursor.advance_cancellable(cancel).await
    }
}
