//! Session transport seam.
//!
//! The client core never talks to a socket itself. A [`Connector`] opens a
//! session to one cluster node and hands back a [`SqlExecutor`], which runs
//! statement text and returns a [`QueryResult`].

pub mod pool;

pub use pool::SqlxConnector;

use crate::config::{ConnectOptions, Endpoint};
use crate::error::IgniteResult;
use crate::value::{Row, Value};

/// An open session able to run SQL.
pub trait SqlExecutor {
    /// Run one statement.
    ///
    /// `parameters` binds a single parameter set. `bulk_parameters` runs the
    /// statement once per set inside this one call and reports one
    /// [`StatementResult`] per set in [`QueryResult::results`].
    fn execute_sql(
        &mut self,
        sql: &str,
        parameters: Option<&[Value]>,
        bulk_parameters: Option<&[Vec<Value>]>,
    ) -> IgniteResult<QueryResult>;

    /// Release the session. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Opens sessions against a cluster node.
pub trait Connector {
    fn open(&self, endpoint: &Endpoint, options: &ConnectOptions)
    -> IgniteResult<Box<dyn SqlExecutor>>;
}

/// What a transport returns for one `execute_sql` call.
///
/// Every field is optional; consumers substitute -1 or an empty sequence
/// when a field is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Option<Vec<Row>>,
    pub columns: Option<Vec<String>>,
    /// Server type names, parallel to `columns`.
    pub column_types: Option<Vec<String>>,
    pub rowcount: Option<i64>,
    /// Server-side duration in milliseconds.
    pub duration: Option<i64>,
    /// Per-statement outcomes of a bulk execution.
    pub results: Option<Vec<StatementResult>>,
}

/// Outcome of one parameter set in a bulk execution. -1 means "not reported".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementResult {
    pub rowcount: i64,
    pub duration: i64,
}

impl StatementResult {
    pub fn new(rowcount: i64, duration: i64) -> Self {
        Self { rowcount, duration }
    }
}

impl QueryResult {
    /// A row-returning result.
    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            rowcount: Some(rows.len() as i64),
            rows: Some(rows),
            columns: Some(columns),
            ..Self::default()
        }
    }

    /// An update-count result.
    pub fn with_rowcount(rowcount: i64) -> Self {
        Self {
            rowcount: Some(rowcount),
            ..Self::default()
        }
    }

    /// Set the server-side duration.
    pub fn duration(mut self, millis: i64) -> Self {
        self.duration = Some(millis);
        self
    }

    /// Set the per-statement bulk results.
    pub fn results(mut self, results: Vec<StatementResult>) -> Self {
        self.results = Some(results);
        self
    }
}
