//! Schema reflection over the metadata commands.

mod common;

use common::{columns, ScriptedConnector};
use igniteworks::config::ConnectOptions;
use igniteworks::dialect::{ColumnInfo, Dialect, IgniteDialect, Inspector, PRIMARY_KEY};
use igniteworks::transport::QueryResult;
use igniteworks::types::SqlType;
use igniteworks::{Connection, IgniteError, Value};
use pretty_assertions::assert_eq;

fn names(values: &[&str]) -> Vec<Vec<Value>> {
    values.iter().map(|v| vec![Value::from(*v)]).collect()
}

fn column_row(name: &str, ty: &str, is_key: bool, nullable: &str) -> Vec<Value> {
    vec![
        Value::from(name),
        Value::from(name),
        Value::from(ty),
        Value::Bool(is_key),
        Value::from(nullable),
        Value::Int(-1),
        Value::Int(-1),
    ]
}

fn cluster() -> ScriptedConnector {
    ScriptedConnector::new()
        .respond(
            "GET CACHES",
            QueryResult::with_rows(columns(&["CACHE_NAME"]), names(&["SQL_PUBLIC_PERSON", "default"])),
        )
        .respond(
            "GET TABLES",
            QueryResult::with_rows(columns(&["TABLE_NAME"]), names(&["PERSON", "CITY"])),
        )
        .respond(
            "GET TABLES FROM EMPTY",
            QueryResult::with_rows(columns(&["TABLE_NAME"]), Vec::new()),
        )
        .respond(
            "GET COLUMNS FROM PERSON",
            QueryResult::with_rows(
                columns(&["NAME", "ALIAS", "TYPE", "KEY", "NULLABLE", "PRECISION", "SCALE"]),
                vec![
                    column_row("ID", "java.lang.Long", true, "false"),
                    column_row("NAME", "java.lang.String", false, "true"),
                    column_row("SALARY", "java.lang.Double", false, "true"),
                    column_row("SHAPE", "org.locationtech.jts.geom.Geometry", false, "true"),
                ],
            ),
        )
        .respond(
            "GET KEYS FROM PERSON WITH PUBLIC",
            QueryResult::with_rows(columns(&["KEY"]), names(&["ID", "CITY_ID"])),
        )
}

fn open(connector: &ScriptedConnector) -> Connection {
    Connection::open(connector, ConnectOptions::new("10.0.0.5:10800")).unwrap()
}

#[test]
fn schema_and_table_names() {
    let connector = cluster();
    let conn = open(&connector);
    let dialect = IgniteDialect;

    assert_eq!(
        dialect.get_schema_names(&conn).unwrap(),
        vec!["SQL_PUBLIC_PERSON", "default"]
    );
    assert_eq!(dialect.get_table_names(&conn, None).unwrap(), vec!["PERSON", "CITY"]);
    assert_eq!(
        dialect.get_table_names(&conn, Some("EMPTY")).unwrap(),
        Vec::<String>::new()
    );
    assert_eq!(
        connector.statements(),
        vec!["GET CACHES", "GET TABLES", "GET TABLES FROM EMPTY"]
    );
}

#[test]
fn columns_map_types_and_nullability() {
    let connector = cluster();
    let conn = open(&connector);

    let columns = IgniteDialect.get_columns(&conn, "PERSON", None).unwrap();
    assert_eq!(
        columns,
        vec![
            ColumnInfo {
                name: "ID".into(),
                sql_type: SqlType::BigInt,
                nullable: false,
            },
            ColumnInfo {
                name: "NAME".into(),
                sql_type: SqlType::String,
                nullable: true,
            },
            ColumnInfo {
                name: "SALARY".into(),
                sql_type: SqlType::Decimal,
                nullable: true,
            },
            ColumnInfo {
                name: "SHAPE".into(),
                sql_type: SqlType::UserDefined,
                nullable: true,
            },
        ]
    );
}

#[test]
fn primary_key_has_fixed_name() {
    let connector = cluster();
    let conn = open(&connector);

    let pk = IgniteDialect
        .get_pk_constraint(&conn, "PERSON", Some("PUBLIC"))
        .unwrap();
    assert_eq!(pk.name, PRIMARY_KEY);
    assert_eq!(pk.constrained_columns, vec!["ID", "CITY_ID"]);
}

#[test]
fn foreign_keys_and_indexes_are_empty() {
    let connector = cluster();
    let conn = open(&connector);

    assert!(IgniteDialect.get_foreign_keys(&conn, "PERSON", None).unwrap().is_empty());
    assert!(IgniteDialect.get_indexes(&conn, "PERSON", None).unwrap().is_empty());
    IgniteDialect.do_rollback(&conn).unwrap();
    assert!(connector.executed().is_empty());
}

#[test]
fn remote_failure_propagates() {
    let connector = cluster().fail("GET COLUMNS FROM NOPE", "Table NOPE not found");
    let conn = open(&connector);

    let err = IgniteDialect.get_columns(&conn, "NOPE", None).unwrap_err();
    assert!(matches!(err, IgniteError::Execution { .. }));
}

#[test]
fn short_metadata_row_is_a_data_error() {
    let connector = ScriptedConnector::new().respond(
        "GET COLUMNS FROM BROKEN",
        QueryResult::with_rows(columns(&["NAME"]), names(&["ID"])),
    );
    let conn = open(&connector);

    let err = IgniteDialect.get_columns(&conn, "BROKEN", None).unwrap_err();
    assert!(matches!(err, IgniteError::Data(_)));
}

#[test]
fn inspector_caches_within_a_pass() {
    let connector = cluster();
    let conn = open(&connector);
    let mut inspector = Inspector::new(&conn);

    let first = inspector.get_columns("PERSON", None).unwrap();
    let second = inspector.get_columns("PERSON", None).unwrap();
    assert_eq!(first, second);
    inspector.get_table_names(None).unwrap();
    inspector.get_table_names(None).unwrap();
    inspector.get_schema_names().unwrap();
    inspector.get_schema_names().unwrap();

    assert_eq!(
        connector.statements(),
        vec!["GET COLUMNS FROM PERSON", "GET TABLES", "GET CACHES"]
    );

    inspector.clear();
    inspector.get_table_names(None).unwrap();
    assert_eq!(connector.statements().len(), 4);
    assert_eq!(inspector.dialect().name(), "igniteworks");
}

#[test]
fn dialect_connect_defaults_port() {
    let connector = ScriptedConnector::new();

    let conn = IgniteDialect
        .connect(&connector, Some("10.0.0.5"), None, ConnectOptions::default())
        .unwrap();
    assert_eq!(conn.endpoint().to_string(), "10.0.0.5:10800");

    let conn = IgniteDialect
        .connect(&connector, Some("ignored"), Some(1), ConnectOptions::new("node-2:47500"))
        .unwrap();
    assert_eq!(conn.endpoint().port, 47500);

    let err = IgniteDialect
        .connect(&connector, None, None, ConnectOptions::default())
        .unwrap_err();
    assert!(err.is_config());
    assert_eq!(connector.opened(), 2);
}
