//! Cursor state machine and result materialization.
//!
//! ```text
//! Open/NoResult --execute--> Open/HasResult --execute--> Open/HasResult
//!        |                          |
//!        +---------close------------+------> Closed (terminal)
//! ```
//!
//! All fetch calls advance one shared position in a materialized row
//! buffer: `fetch_one`, `fetch_many`, `fetch_all` and iteration never see
//! the same row twice. The position is plain mutable state; concurrent
//! fetches on one cursor must be serialized by the caller.

use std::fmt;

use crate::connection::Connection;
use crate::error::{IgniteError, IgniteResult};
use crate::transport::{QueryResult, StatementResult};
use crate::value::{Row, Value};

/// One entry of [`Cursor::description`].
///
/// Only `name` and `type_code` are ever filled; the remaining fields exist
/// to keep the seven-field shape generic callers expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub type_code: Option<String>,
    pub display_size: Option<i64>,
    pub internal_size: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub null_ok: Option<bool>,
}

impl ColumnDescription {
    fn new(name: String, type_code: Option<String>) -> Self {
        Self {
            name,
            type_code,
            display_size: None,
            internal_size: None,
            precision: None,
            scale: None,
            null_ok: None,
        }
    }
}

/// Materialized rows plus the shared read position.
#[derive(Debug, Default)]
struct RowBuffer {
    rows: Vec<Row>,
    position: usize,
}

impl RowBuffer {
    fn new(rows: Vec<Row>) -> Self {
        Self { rows, position: 0 }
    }

    /// Hand out the next row, leaving an empty slot behind.
    fn advance(&mut self) -> Option<Row> {
        let slot = self.rows.get_mut(self.position)?;
        self.position += 1;
        Some(std::mem::take(slot))
    }

    fn clear(&mut self) {
        self.rows = Vec::new();
        self.position = 0;
    }
}

/// Executes statements on a [`Connection`] and iterates their results.
///
/// Created by [`Connection::cursor`]. A cursor stays usable after its
/// connection closes, but the next `execute` fails with
/// [`IgniteError::ConnectionClosed`].
pub struct Cursor<'c> {
    connection: &'c Connection,
    array_size: usize,
    closed: bool,
    result: Option<QueryResult>,
    rows: Option<RowBuffer>,
    /// Set once iteration yielded an error; cleared by the next execute.
    iter_failed: bool,
}

impl<'c> Cursor<'c> {
    pub(crate) fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
            array_size: 1,
            closed: false,
            result: None,
            rows: None,
            iter_failed: false,
        }
    }

    /// The connection this cursor was created from.
    pub fn connection(&self) -> &'c Connection {
        self.connection
    }

    /// Execute a statement without parameters.
    pub fn execute(&mut self, sql: &str) -> IgniteResult<()> {
        self.execute_params(sql, None, None)
    }

    /// Execute a statement with one parameter set.
    pub fn execute_with(&mut self, sql: &str, parameters: &[Value]) -> IgniteResult<()> {
        self.execute_params(sql, Some(parameters), None)
    }

    /// Execute a statement, storing the transport result as-is.
    ///
    /// Replaces any previous result and restarts iteration at the first row
    /// of the new one. A result without row data leaves an empty row set.
    /// On error the previous result is kept untouched.
    pub fn execute_params(
        &mut self,
        sql: &str,
        parameters: Option<&[Value]>,
        bulk_parameters: Option<&[Vec<Value>]>,
    ) -> IgniteResult<()> {
        let result = self.submit(sql, parameters, bulk_parameters)?;
        self.store(result);
        Ok(())
    }

    /// Execute `sql` once per parameter set, in a single transport call.
    ///
    /// The stored result carries no rows; its row count and duration are
    /// the sums of what the individual statements reported (-1 if none
    /// reported anything). When no statement reports a duration, the
    /// batch-level duration is used if the transport gave one. Returns the
    /// per-statement results.
    pub fn execute_many(
        &mut self,
        sql: &str,
        seq_of_parameters: &[Vec<Value>],
    ) -> IgniteResult<Vec<StatementResult>> {
        let raw = self.submit(sql, None, Some(seq_of_parameters))?;
        let (aggregate, results) = aggregate_batch(raw);
        self.store(aggregate);
        Ok(results)
    }

    fn submit(
        &self,
        sql: &str,
        parameters: Option<&[Value]>,
        bulk_parameters: Option<&[Vec<Value>]>,
    ) -> IgniteResult<QueryResult> {
        if self.connection.is_closed() {
            return Err(IgniteError::ConnectionClosed);
        }
        if self.closed {
            return Err(IgniteError::CursorClosed);
        }
        if sql.trim().is_empty() {
            return Err(IgniteError::MissingStatement);
        }

        tracing::debug!(
            sql,
            parameters = parameters.map_or(0, |p| p.len()),
            parameter_sets = bulk_parameters.map_or(0, |b| b.len()),
            "executing statement"
        );
        self.connection
            .execute_sql(sql, parameters, bulk_parameters)
    }

    fn store(&mut self, mut result: QueryResult) {
        let rows = result.rows.take().unwrap_or_default();
        tracing::debug!(
            rows = rows.len(),
            rowcount = ?result.rowcount,
            duration = ?result.duration,
            "statement finished"
        );
        self.rows = Some(RowBuffer::new(rows));
        self.result = Some(result);
        self.iter_failed = false;
    }

    /// The next row, or `Ok(None)` once the rows are exhausted.
    ///
    /// Fails with [`IgniteError::NoResult`] before the first successful
    /// execute, and with [`IgniteError::CursorClosed`] after `close`.
    pub fn next_row(&mut self) -> IgniteResult<Option<Row>> {
        let buffer = self.rows.as_mut().ok_or(IgniteError::NoResult)?;
        if self.closed {
            return Err(IgniteError::CursorClosed);
        }
        Ok(buffer.advance())
    }

    /// Alias for [`Cursor::next_row`].
    pub fn fetch_one(&mut self) -> IgniteResult<Option<Row>> {
        self.next_row()
    }

    /// Up to `count` rows; `None` uses [`Cursor::array_size`], `Some(0)`
    /// fetches everything left. Returns fewer rows once exhausted.
    pub fn fetch_many(&mut self, count: Option<usize>) -> IgniteResult<Vec<Row>> {
        let count = count.unwrap_or(self.array_size);
        if count == 0 {
            return self.fetch_all();
        }

        let mut rows = Vec::with_capacity(count);
        while rows.len() < count {
            match self.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// All remaining rows.
    pub fn fetch_all(&mut self) -> IgniteResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Column descriptions of the current result.
    ///
    /// `None` once closed; empty when the result has no column metadata.
    pub fn description(&self) -> Option<Vec<ColumnDescription>> {
        if self.closed {
            return None;
        }

        let Some(result) = &self.result else {
            return Some(Vec::new());
        };
        let columns = result.columns.as_deref().unwrap_or_default();
        let types = result.column_types.as_deref().unwrap_or_default();

        Some(
            columns
                .iter()
                .enumerate()
                .map(|(i, name)| ColumnDescription::new(name.clone(), types.get(i).cloned()))
                .collect(),
        )
    }

    /// Rows produced or affected by the last execute, or -1.
    pub fn row_count(&self) -> i64 {
        self.reported(|r| r.rowcount)
    }

    /// Server-side duration of the last execute in milliseconds, or -1.
    pub fn duration(&self) -> i64 {
        self.reported(|r| r.duration)
    }

    fn reported(&self, field: impl Fn(&QueryResult) -> Option<i64>) -> i64 {
        if self.closed {
            return -1;
        }
        self.result.as_ref().and_then(field).unwrap_or(-1)
    }

    /// Default batch size of [`Cursor::fetch_many`].
    pub fn array_size(&self) -> usize {
        self.array_size
    }

    pub fn set_array_size(&mut self, size: usize) {
        self.array_size = size;
    }

    /// Accepted for interface compatibility. Has no effect.
    pub fn set_input_sizes(&mut self, _sizes: &[usize]) {}

    /// Accepted for interface compatibility. Has no effect.
    pub fn set_output_size(&mut self, _size: usize, _column: Option<usize>) {}

    /// Close the cursor and drop its result. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        self.result = None;
        if let Some(buffer) = self.rows.as_mut() {
            buffer.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Iterates the shared row position.
///
/// Exhaustion ends the iteration. A closed cursor or one that never
/// executed yields a single `Err`, then ends.
impl Iterator for Cursor<'_> {
    type Item = IgniteResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.iter_failed {
            return None;
        }
        let item = self.next_row().transpose();
        if matches!(item, Some(Err(_))) {
            self.iter_failed = true;
        }
        item
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("endpoint", self.connection.endpoint())
            .field("closed", &self.closed)
            .field("array_size", &self.array_size)
            .field("row_count", &self.row_count())
            .finish()
    }
}

/// Collapse a bulk transport result into the cursor's stored result.
///
/// Depends only on the transport result, never on cursor state.
fn aggregate_batch(raw: QueryResult) -> (QueryResult, Vec<StatementResult>) {
    let results = raw.results.unwrap_or_default();

    let rowcount = sum_reported(results.iter().map(|r| r.rowcount));
    let duration = match sum_reported(results.iter().map(|r| r.duration)) {
        -1 => raw.duration.filter(|d| *d >= 0).unwrap_or(-1),
        total => total,
    };

    let aggregate = QueryResult {
        rows: Some(Vec::new()),
        columns: Some(raw.columns.unwrap_or_default()),
        column_types: raw.column_types,
        rowcount: Some(rowcount),
        duration: Some(duration),
        results: Some(results.clone()),
    };
    (aggregate, results)
}

/// Sum of the non-negative values, or -1 when there are none.
fn sum_reported(values: impl Iterator<Item = i64>) -> i64 {
    values
        .filter(|v| *v >= 0)
        .fold(None, |acc: Option<i64>, v| Some(acc.unwrap_or(0) + v))
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bulk(rowcounts: &[i64], durations: &[i64]) -> QueryResult {
        QueryResult {
            columns: Some(vec!["id".into()]),
            results: Some(
                rowcounts
                    .iter()
                    .zip(durations)
                    .map(|(r, d)| StatementResult::new(*r, *d))
                    .collect(),
            ),
            ..QueryResult::default()
        }
    }

    #[test]
    fn test_aggregate_sums_non_negative_counts() {
        let (agg, results) = aggregate_batch(bulk(&[1, 2, -1], &[3, -1, 4]));
        assert_eq!(agg.rowcount, Some(3));
        assert_eq!(agg.duration, Some(7));
        assert_eq!(agg.rows, Some(vec![]));
        assert_eq!(agg.columns, Some(vec!["id".to_string()]));
        assert_eq!(results.len(), 3);
        assert_eq!(results[2], StatementResult::new(-1, 4));
    }

    #[test]
    fn test_aggregate_nothing_reported() {
        let (agg, _) = aggregate_batch(bulk(&[-1, -1, -1], &[-1, -1, -1]));
        assert_eq!(agg.rowcount, Some(-1));
        assert_eq!(agg.duration, Some(-1));
    }

    #[test]
    fn test_aggregate_falls_back_to_batch_duration() {
        let (agg, _) = aggregate_batch(bulk(&[1], &[-1]).duration(12));
        assert_eq!(agg.duration, Some(12));
    }

    #[test]
    fn test_aggregate_without_results() {
        let (agg, results) = aggregate_batch(QueryResult::default());
        assert!(results.is_empty());
        assert_eq!(agg.rowcount, Some(-1));
        assert_eq!(agg.columns, Some(vec![]));
    }

    #[test]
    fn test_sum_reported() {
        assert_eq!(sum_reported([0, -1].into_iter()), 0);
        assert_eq!(sum_reported(std::iter::empty()), -1);
    }

    #[test]
    fn test_row_buffer_single_pass() {
        let mut buffer = RowBuffer::new(vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        assert_eq!(buffer.advance(), Some(vec![Value::Int(1)]));
        assert_eq!(buffer.advance(), Some(vec![Value::Int(2)]));
        assert_eq!(buffer.advance(), None);
        buffer.clear();
        assert_eq!(buffer.advance(), None);
    }
}
