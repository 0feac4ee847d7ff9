//! Schema reflection for generic SQL toolkits.
//!
//! The cluster answers four metadata commands through its SQL endpoint:
//!
//! | Command                                  | Reflection call       |
//! |------------------------------------------|-----------------------|
//! | `GET COLUMNS FROM <table> [WITH <schema>]` | `get_columns`       |
//! | `GET CACHES`                             | `get_schema_names`    |
//! | `GET TABLES [FROM <schema>]`             | `get_table_names`     |
//! | `GET KEYS FROM <table> [WITH <schema>]`  | `get_pk_constraint`   |
//!
//! Foreign keys and indexes do not exist on the cluster and always reflect
//! as empty.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::{ConnectOptions, DEFAULT_PORT};
use crate::connection::Connection;
use crate::error::{IgniteError, IgniteResult};
use crate::transport::Connector;
use crate::types::{resolve_type, SqlType};
use crate::value::{Row, Value};

/// Name of the single primary key constraint every table reflects.
pub const PRIMARY_KEY: &str = "PRIMARY KEY";

/// A reflected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    pub nullable: bool,
}

/// A reflected primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryKeyConstraint {
    pub name: String,
    pub constrained_columns: Vec<String>,
}

/// A reflected foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub constrained_columns: Vec<String>,
    pub referred_schema: Option<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

/// A reflected index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    pub name: String,
    pub column_names: Vec<String>,
    pub unique: bool,
}

/// `GET COLUMNS FROM <table> [WITH <schema>]`
pub fn columns_query(table: &str, schema: Option<&str>) -> String {
    with_schema(format!("GET COLUMNS FROM {}", table), "WITH", schema)
}

/// `GET CACHES`
pub fn caches_query() -> &'static str {
    "GET CACHES"
}

/// `GET TABLES [FROM <schema>]`
pub fn tables_query(schema: Option<&str>) -> String {
    with_schema("GET TABLES".to_string(), "FROM", schema)
}

/// `GET KEYS FROM <table> [WITH <schema>]`
pub fn keys_query(table: &str, schema: Option<&str>) -> String {
    with_schema(format!("GET KEYS FROM {}", table), "WITH", schema)
}

fn with_schema(mut sql: String, keyword: &str, schema: Option<&str>) -> String {
    if let Some(schema) = schema.filter(|s| !s.is_empty()) {
        sql.push(' ');
        sql.push_str(keyword);
        sql.push(' ');
        sql.push_str(schema);
    }
    sql
}

/// Reflection contract a toolkit dialect layer implements.
pub trait Dialect {
    /// Dialect name as registered with the toolkit.
    fn name(&self) -> &'static str;

    fn get_columns(
        &self,
        conn: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> IgniteResult<Vec<ColumnInfo>>;

    fn get_schema_names(&self, conn: &Connection) -> IgniteResult<Vec<String>>;

    fn get_table_names(&self, conn: &Connection, schema: Option<&str>) -> IgniteResult<Vec<String>>;

    fn get_pk_constraint(
        &self,
        conn: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> IgniteResult<PrimaryKeyConstraint>;

    fn get_foreign_keys(
        &self,
        conn: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> IgniteResult<Vec<ForeignKey>>;

    fn get_indexes(
        &self,
        conn: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> IgniteResult<Vec<Index>>;

    /// Called by toolkits after a failed statement.
    fn do_rollback(&self, conn: &Connection) -> IgniteResult<()>;
}

/// Reflection against the cluster's metadata commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgniteDialect;

impl IgniteDialect {
    /// Server address from toolkit connect arguments.
    ///
    /// An explicit `servers` string wins; otherwise `host` with `port`
    /// (default 10800). Neither yields `None`.
    pub fn server_address(
        host: Option<&str>,
        port: Option<u16>,
        servers: Option<&str>,
    ) -> Option<String> {
        match (servers, host) {
            (Some(servers), _) => Some(servers.to_string()),
            (None, Some(host)) => Some(format!("{}:{}", host, port.unwrap_or(DEFAULT_PORT))),
            (None, None) => None,
        }
    }

    /// Open a connection from toolkit connect arguments.
    pub fn connect<C: Connector + ?Sized>(
        &self,
        connector: &C,
        host: Option<&str>,
        port: Option<u16>,
        mut options: ConnectOptions,
    ) -> IgniteResult<Connection> {
        let servers = options.servers.take();
        options.servers = Self::server_address(host, port, servers.as_deref());
        Connection::open(connector, options)
    }
}

impl Dialect for IgniteDialect {
    fn name(&self) -> &'static str {
        "igniteworks"
    }

    fn get_columns(
        &self,
        conn: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> IgniteResult<Vec<ColumnInfo>> {
        query_rows(conn, &columns_query(table, schema))?
            .iter()
            .map(column_info)
            .collect()
    }

    fn get_schema_names(&self, conn: &Connection) -> IgniteResult<Vec<String>> {
        first_column(&query_rows(conn, caches_query())?)
    }

    fn get_table_names(&self, conn: &Connection, schema: Option<&str>) -> IgniteResult<Vec<String>> {
        first_column(&query_rows(conn, &tables_query(schema))?)
    }

    fn get_pk_constraint(
        &self,
        conn: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> IgniteResult<PrimaryKeyConstraint> {
        let keys = first_column(&query_rows(conn, &keys_query(table, schema))?)?;
        Ok(PrimaryKeyConstraint {
            name: PRIMARY_KEY.to_string(),
            constrained_columns: keys,
        })
    }

    fn get_foreign_keys(
        &self,
        _conn: &Connection,
        _table: &str,
        _schema: Option<&str>,
    ) -> IgniteResult<Vec<ForeignKey>> {
        Ok(Vec::new())
    }

    fn get_indexes(
        &self,
        _conn: &Connection,
        _table: &str,
        _schema: Option<&str>,
    ) -> IgniteResult<Vec<Index>> {
        Ok(Vec::new())
    }

    fn do_rollback(&self, _conn: &Connection) -> IgniteResult<()> {
        // No transactions: the toolkit then re-raises the original error.
        Ok(())
    }
}

fn query_rows(conn: &Connection, sql: &str) -> IgniteResult<Vec<Row>> {
    let mut cursor = conn.cursor()?;
    cursor.execute(sql)?;
    let rows = cursor.fetch_all()?;
    cursor.close();
    Ok(rows)
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_column(rows: &[Row]) -> IgniteResult<Vec<String>> {
    rows.iter()
        .map(|row| {
            row.first()
                .map(text)
                .ok_or_else(|| IgniteError::Data("metadata row has no columns".into()))
        })
        .collect()
}

/// Build a [`ColumnInfo`] from a `GET COLUMNS` row:
/// `[name, alias, type, is_key, is_nullable, precision, scale]`.
fn column_info(row: &Row) -> IgniteResult<ColumnInfo> {
    let field = |index: usize| {
        row.get(index).ok_or_else(|| {
            IgniteError::Data(format!(
                "GET COLUMNS row has {} fields, expected at least 5",
                row.len()
            ))
        })
    };

    Ok(ColumnInfo {
        name: text(field(0)?),
        sql_type: resolve_type(&text(field(2)?)),
        nullable: field(4)?.as_str() == Some("true"),
    })
}

type TableKey = (String, Option<String>);

/// Caches reflection results for the lifetime of one reflection pass.
///
/// Metadata commands are pure reads, so repeating one within a pass returns
/// the cached answer without a round trip.
pub struct Inspector<'c, D: Dialect = IgniteDialect> {
    conn: &'c Connection,
    dialect: D,
    columns: HashMap<TableKey, Vec<ColumnInfo>>,
    schemas: Option<Vec<String>>,
    tables: HashMap<Option<String>, Vec<String>>,
    primary_keys: HashMap<TableKey, PrimaryKeyConstraint>,
}

impl<'c> Inspector<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self::with_dialect(conn, IgniteDialect)
    }
}

impl<'c, D: Dialect> Inspector<'c, D> {
    pub fn with_dialect(conn: &'c Connection, dialect: D) -> Self {
        Self {
            conn,
            dialect,
            columns: HashMap::new(),
            schemas: None,
            tables: HashMap::new(),
            primary_keys: HashMap::new(),
        }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    pub fn get_columns(&mut self, table: &str, schema: Option<&str>) -> IgniteResult<Vec<ColumnInfo>> {
        let key = table_key(table, schema);
        if let Some(hit) = self.columns.get(&key) {
            return Ok(hit.clone());
        }
        let columns = self.dialect.get_columns(self.conn, table, schema)?;
        self.columns.insert(key, columns.clone());
        Ok(columns)
    }

    pub fn get_schema_names(&mut self) -> IgniteResult<Vec<String>> {
        if let Some(hit) = &self.schemas {
            return Ok(hit.clone());
        }
        let schemas = self.dialect.get_schema_names(self.conn)?;
        self.schemas = Some(schemas.clone());
        Ok(schemas)
    }

    pub fn get_table_names(&mut self, schema: Option<&str>) -> IgniteResult<Vec<String>> {
        let key = schema.map(str::to_string);
        if let Some(hit) = self.tables.get(&key) {
            return Ok(hit.clone());
        }
        let tables = self.dialect.get_table_names(self.conn, schema)?;
        self.tables.insert(key, tables.clone());
        Ok(tables)
    }

    pub fn get_pk_constraint(
        &mut self,
        table: &str,
        schema: Option<&str>,
    ) -> IgniteResult<PrimaryKeyConstraint> {
        let key = table_key(table, schema);
        if let Some(hit) = self.primary_keys.get(&key) {
            return Ok(hit.clone());
        }
        let pk = self.dialect.get_pk_constraint(self.conn, table, schema)?;
        self.primary_keys.insert(key, pk.clone());
        Ok(pk)
    }

    pub fn get_foreign_keys(&self, table: &str, schema: Option<&str>) -> IgniteResult<Vec<ForeignKey>> {
        self.dialect.get_foreign_keys(self.conn, table, schema)
    }

    pub fn get_indexes(&self, table: &str, schema: Option<&str>) -> IgniteResult<Vec<Index>> {
        self.dialect.get_indexes(self.conn, table, schema)
    }

    /// Forget everything; the next calls go back to the cluster.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.schemas = None;
        self.tables.clear();
        self.primary_keys.clear();
    }
}

fn table_key(table: &str, schema: Option<&str>) -> TableKey {
    (table.to_string(), schema.map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_query_templates() {
        assert_eq!(columns_query("PERSON", None), "GET COLUMNS FROM PERSON");
        assert_eq!(
            columns_query("PERSON", Some("PUBLIC")),
            "GET COLUMNS FROM PERSON WITH PUBLIC"
        );
        assert_eq!(tables_query(None), "GET TABLES");
        assert_eq!(tables_query(Some("PUBLIC")), "GET TABLES FROM PUBLIC");
        assert_eq!(tables_query(Some("")), "GET TABLES");
        assert_eq!(keys_query("PERSON", Some("S")), "GET KEYS FROM PERSON WITH S");
        assert_eq!(caches_query(), "GET CACHES");
    }

    #[test]
    fn test_column_info() {
        let row: Row = vec![
            "NAME".into(),
            "NAME".into(),
            "java.lang.String".into(),
            "false".into(),
            "true".into(),
            Value::Int(-1),
            Value::Int(-1),
        ];
        assert_eq!(
            column_info(&row).unwrap(),
            ColumnInfo {
                name: "NAME".into(),
                sql_type: SqlType::String,
                nullable: true,
            }
        );
    }

    #[test]
    fn test_column_info_nullable_is_literal_true() {
        let base = |flag: Value| -> Row {
            vec!["ID".into(), "ID".into(), "java.lang.Long".into(), "true".into(), flag]
        };
        assert!(!column_info(&base(Value::Bool(true))).unwrap().nullable);
        assert!(!column_info(&base("TRUE".into())).unwrap().nullable);
        assert!(!column_info(&base(Value::Null)).unwrap().nullable);
    }

    #[test]
    fn test_column_info_short_row() {
        let row: Row = vec!["ID".into(), "ID".into()];
        assert!(matches!(column_info(&row), Err(IgniteError::Data(_))));
    }

    #[test]
    fn test_first_column() {
        let rows: Vec<Row> = vec![vec!["A".into(), Value::Int(1)], vec![Value::Int(2)]];
        assert_eq!(first_column(&rows).unwrap(), vec!["A".to_string(), "2".to_string()]);
        assert_eq!(first_column(&[]).unwrap(), Vec::<String>::new());
        assert!(first_column(&[vec![]]).is_err());
    }

    #[test]
    fn test_server_address() {
        assert_eq!(
            IgniteDialect::server_address(Some("node1"), None, None).as_deref(),
            Some("node1:10800")
        );
        assert_eq!(
            IgniteDialect::server_address(Some("node1"), Some(47500), None).as_deref(),
            Some("node1:47500")
        );
        assert_eq!(
            IgniteDialect::server_address(Some("node1"), None, Some("node2:1")).as_deref(),
            Some("node2:1")
        );
        assert_eq!(IgniteDialect::server_address(None, Some(1), None), None);
    }
}
