//! Session transport over a sqlx `AnyPool`.
//!
//! The pool is async; the session owns a current-thread tokio runtime and
//! blocks on it, so callers of the client core never see a future.

use std::future::Future;
use std::time::{Duration, Instant};

use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Executor, Row, TypeInfo};
use tokio::runtime::Runtime;

use super::{Connector, QueryResult, SqlExecutor, StatementResult};
use crate::config::{CertReqs, ConnectOptions, Endpoint};
use crate::error::{IgniteError, IgniteResult};
use crate::parser::{self, StatementKind};
use crate::value::{Row as ValueRow, Value};

type AnyColumn = <Any as sqlx::Database>::Column;

#[derive(Debug, Clone)]
enum Target {
    /// Build `<scheme>://user:pass@host:port/<database>` from the endpoint.
    Scheme {
        scheme: String,
        database: Option<String>,
    },
    /// Use this URL verbatim; the endpoint is only validated.
    Url(String),
}

/// Opens [`SqlxSession`]s.
///
/// # Example
///
/// ```rust,ignore
/// let connector = SqlxConnector::new("postgres").database("ignite");
/// let conn = Connection::open(&connector, ConnectOptions::new("10.0.0.5:5432"))?;
/// ```
#[derive(Debug, Clone)]
pub struct SqlxConnector {
    target: Target,
    max_connections: u32,
}

impl SqlxConnector {
    /// Connect with the given URL scheme (`postgres`, `mysql`, ...).
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            target: Target::Scheme {
                scheme: scheme.into(),
                database: None,
            },
            max_connections: 1,
        }
    }

    /// Always connect to a fixed URL, e.g. `sqlite::memory:`.
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            target: Target::Url(url.into()),
            max_connections: 1,
        }
    }

    /// Database path appended to a scheme URL.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        if let Target::Scheme { database: db, .. } = &mut self.target {
            *db = Some(database.into());
        }
        self
    }

    /// Pool size. Defaults to a single connection, matching one cluster session.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// The URL handed to sqlx for this endpoint.
    pub fn connection_url(&self, endpoint: &Endpoint, options: &ConnectOptions) -> String {
        let (scheme, database) = match &self.target {
            Target::Url(url) => return url.clone(),
            Target::Scheme { scheme, database } => (scheme, database),
        };

        let mut url = format!("{}://", scheme);
        if let Some(user) = &options.credentials.username {
            url.push_str(&encode_userinfo(user));
            if let Some(password) = &options.credentials.password {
                url.push(':');
                url.push_str(&encode_userinfo(password));
            }
            url.push('@');
        }
        url.push_str(&endpoint.to_string());
        if let Some(db) = database {
            url.push('/');
            url.push_str(db);
        }

        let params = tls_params(scheme, options);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }
}

impl Connector for SqlxConnector {
    fn open(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> IgniteResult<Box<dyn SqlExecutor>> {
        sqlx::any::install_default_drivers();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let url = self.connection_url(endpoint, options);
        if let Target::Scheme { scheme, .. } = &self.target {
            let ignored = ignored_tls_settings(scheme, options);
            if !ignored.is_empty() {
                tracing::warn!(
                    %scheme,
                    settings = ?ignored,
                    "TLS settings not supported by this driver are ignored"
                );
            }
        }
        tracing::debug!(%endpoint, ssl = options.use_ssl(), "opening sqlx session");

        let pool = runtime
            .block_on(
                AnyPoolOptions::new()
                    .max_connections(self.max_connections)
                    .acquire_timeout(options.handshake_timeout)
                    .idle_timeout(None::<Duration>)
                    .max_lifetime(None::<Duration>)
                    .connect(&url),
            )
            .map_err(|e| IgniteError::Connection(e.to_string()))?;

        Ok(Box::new(SqlxSession {
            runtime,
            pool: Some(pool),
            timeout: options.timeout,
        }))
    }
}

/// A live session backed by an `AnyPool`.
pub struct SqlxSession {
    runtime: Runtime,
    pool: Option<AnyPool>,
    timeout: Option<Duration>,
}

impl SqlxSession {
    /// Drive a future to completion, enforcing the per-operation timeout.
    fn run<F, T>(&self, fut: F) -> IgniteResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        let outcome = match self.timeout {
            Some(limit) => self
                .runtime
                .block_on(async { tokio::time::timeout(limit, fut).await })
                .map_err(|_| IgniteError::Timeout(limit.as_millis()))?,
            None => self.runtime.block_on(fut),
        };
        outcome.map_err(map_sqlx_error)
    }

    fn pool(&self) -> IgniteResult<AnyPool> {
        self.pool
            .clone()
            .ok_or_else(|| IgniteError::Connection("Session closed".into()))
    }

    fn execute_single(&self, sql: &str, params: &[Value]) -> IgniteResult<QueryResult> {
        let pool = self.pool()?;
        let started = Instant::now();

        match parser::statement_kind(sql) {
            StatementKind::Query => {
                let rows: Vec<AnyRow> = self.run(bind_all(sqlx::query(sql), params).fetch_all(&pool))?;
                let elapsed = elapsed_millis(started);

                let (columns, column_types) = match rows.first() {
                    Some(row) => column_metadata(row.columns()),
                    None => self.describe_columns(&pool, sql),
                };
                let values: Vec<ValueRow> = rows.iter().map(row_values).collect();
                tracing::trace!(rows = values.len(), "materialized rows");

                let mut result = QueryResult::with_rows(columns, values).duration(elapsed);
                result.column_types = Some(column_types);
                Ok(result)
            }
            StatementKind::Update => {
                let done = self.run(bind_all(sqlx::query(sql), params).execute(&pool))?;
                Ok(QueryResult::with_rowcount(done.rows_affected() as i64)
                    .duration(elapsed_millis(started)))
            }
        }
    }

    /// Column names and types of a statement that returned no rows.
    fn describe_columns(&self, pool: &AnyPool, sql: &str) -> (Vec<String>, Vec<String>) {
        match self.run(pool.describe(sql)) {
            Ok(described) => column_metadata(described.columns()),
            Err(e) => {
                tracing::debug!(error = %e, "cannot describe empty result");
                (Vec::new(), Vec::new())
            }
        }
    }

    fn execute_bulk(&self, sql: &str, sets: &[Vec<Value>]) -> IgniteResult<QueryResult> {
        let pool = self.pool()?;
        let started = Instant::now();
        let mut results = Vec::with_capacity(sets.len());

        for params in sets {
            let statement_started = Instant::now();
            let done = self.run(bind_all(sqlx::query(sql), params).execute(&pool))?;
            results.push(StatementResult::new(
                done.rows_affected() as i64,
                elapsed_millis(statement_started),
            ));
        }

        Ok(QueryResult {
            rows: Some(Vec::new()),
            columns: Some(Vec::new()),
            duration: Some(elapsed_millis(started)),
            results: Some(results),
            ..QueryResult::default()
        })
    }
}

impl SqlExecutor for SqlxSession {
    fn execute_sql(
        &mut self,
        sql: &str,
        parameters: Option<&[Value]>,
        bulk_parameters: Option<&[Vec<Value>]>,
    ) -> IgniteResult<QueryResult> {
        match bulk_parameters {
            Some(sets) => self.execute_bulk(sql, sets),
            None => self.execute_single(sql, parameters.unwrap_or(&[])),
        }
    }

    fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.runtime.block_on(pool.close());
            tracing::debug!("sqlx session closed");
        }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &'q [Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::String(v) => query.bind(v.as_str()),
            Value::Bytes(v) => query.bind(v.clone()),
            Value::Date(_) | Value::Time(_) | Value::Timestamp(_) => query.bind(value.to_string()),
        };
    }
    query
}

fn column_metadata(columns: &[AnyColumn]) -> (Vec<String>, Vec<String>) {
    columns
        .iter()
        .map(|c| (c.name().to_string(), c.type_info().name().to_string()))
        .unzip()
}

/// Convert an AnyRow to values in column order.
fn row_values(row: &AnyRow) -> ValueRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| match column.type_info().name() {
            "NULL" => Value::Null,
            "BOOL" | "BOOLEAN" => row
                .try_get::<bool, _>(i)
                .map(Value::Bool)
                .unwrap_or(Value::Null),
            "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "BIGINT" => integer(row, i),
            "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE" => float(row, i),
            "BLOB" | "BYTEA" => row
                .try_get::<Vec<u8>, _>(i)
                .map(Value::Bytes)
                .unwrap_or(Value::Null),
            _ => row
                .try_get::<String, _>(i)
                .map(Value::String)
                .unwrap_or_else(|_| match integer(row, i) {
                    Value::Null => float(row, i),
                    v => v,
                }),
        })
        .collect()
}

fn integer(row: &AnyRow, i: usize) -> Value {
    row.try_get::<i64, _>(i)
        .or_else(|_| row.try_get::<i32, _>(i).map(i64::from))
        .or_else(|_| row.try_get::<i16, _>(i).map(i64::from))
        .map(Value::Int)
        .unwrap_or(Value::Null)
}

fn float(row: &AnyRow, i: usize) -> Value {
    row.try_get::<f64, _>(i)
        .or_else(|_| row.try_get::<f32, _>(i).map(f64::from))
        .map(Value::Float)
        .unwrap_or(Value::Null)
}

fn elapsed_millis(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

fn map_sqlx_error(e: sqlx::Error) -> IgniteError {
    match e {
        sqlx::Error::Database(db) => IgniteError::Execution {
            message: db.message().to_string(),
            trace: db.code().map(|code| format!("SQLSTATE {}", code)),
        },
        sqlx::Error::Io(io) => IgniteError::Connection(io.to_string()),
        sqlx::Error::Tls(tls) => IgniteError::Connection(format!("TLS error: {}", tls)),
        err @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
            IgniteError::Connection(err.to_string())
        }
        other => IgniteError::execution(other.to_string()),
    }
}

/// Query-string TLS settings for the drivers that understand them.
fn tls_params(scheme: &str, options: &ConnectOptions) -> Vec<String> {
    let tls = &options.tls;
    let mut params = Vec::new();

    match scheme {
        "postgres" | "postgresql" => {
            let mode = match (options.use_ssl(), tls.cert_reqs) {
                (false, _) => "disable",
                (true, CertReqs::None) => "require",
                (true, CertReqs::Optional) => "verify-ca",
                (true, CertReqs::Required) => "verify-full",
            };
            params.push(format!("sslmode={}", mode));
            if options.use_ssl() {
                if let Some(ca) = &tls.ca_certfile {
                    params.push(format!("sslrootcert={}", ca.display()));
                }
                if let Some(cert) = &tls.certfile {
                    params.push(format!("sslcert={}", cert.display()));
                }
                if let Some(key) = &tls.keyfile {
                    params.push(format!("sslkey={}", key.display()));
                }
            }
        }
        "mysql" | "mariadb" => {
            let mode = match (options.use_ssl(), tls.cert_reqs) {
                (false, _) => "DISABLED",
                (true, CertReqs::None) => "REQUIRED",
                (true, CertReqs::Optional) => "VERIFY_CA",
                (true, CertReqs::Required) => "VERIFY_IDENTITY",
            };
            params.push(format!("ssl-mode={}", mode));
            if options.use_ssl() {
                if let Some(ca) = &tls.ca_certfile {
                    params.push(format!("ssl-ca={}", ca.display()));
                }
            }
        }
        _ => {}
    }
    params
}

/// TLS settings that were supplied but that `tls_params` cannot pass on.
fn ignored_tls_settings(scheme: &str, options: &ConnectOptions) -> Vec<&'static str> {
    let tls = &options.tls;
    if !options.use_ssl() {
        return Vec::new();
    }

    let mut ignored = Vec::new();
    if tls.version.is_some() {
        ignored.push("version");
    }
    if tls.ciphers.is_some() {
        ignored.push("ciphers");
    }
    if tls.keyfile_password.is_some() {
        ignored.push("keyfile_password");
    }
    let (certfile, keyfile, ca_certfile) = match scheme {
        "postgres" | "postgresql" => (false, false, false),
        "mysql" | "mariadb" => (true, true, false),
        _ => (true, true, true),
    };
    if certfile && tls.certfile.is_some() {
        ignored.push("certfile");
    }
    if keyfile && tls.keyfile.is_some() {
        ignored.push("keyfile");
    }
    if ca_certfile && tls.ca_certfile.is_some() {
        ignored.push("ca_certfile");
    }
    ignored
}

/// Percent-encode the user and password parts of a URL.
fn encode_userinfo(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
