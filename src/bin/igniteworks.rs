//! igniteworks: run SQL against a cluster's SQL endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Execute a query
//! igniteworks "SELECT * FROM PERSON" --servers 10.0.0.5:10800
//!
//! # With parameters
//! igniteworks "SELECT * FROM PERSON WHERE ID = ?" --bind 42
//!
//! # Batch insert
//! igniteworks "INSERT INTO PERSON VALUES (?, ?)" --bulk "1,'Ada'" --bulk "2,'Linus'"
//!
//! # Reflection
//! igniteworks tables --schema PUBLIC
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use igniteworks::config::{self, DEFAULT_PORT};
use igniteworks::parser;
use igniteworks::prelude::*;
use igniteworks::types::TYPE_MAP;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "igniteworks")]
#[command(version)]
#[command(about = "DB-API style SQL client for cache clusters", long_about = None)]
#[command(after_help = "EXAMPLES:
    igniteworks 'SELECT * FROM PERSON' -s 10.0.0.5:10800
    igniteworks 'SELECT * FROM PERSON WHERE ID = ?' --bind 42
    igniteworks 'INSERT INTO PERSON VALUES (?, ?)' --bulk \"1,'Ada'\" --bulk \"2,'Linus'\"
    igniteworks columns PERSON --schema PUBLIC")]
struct Cli {
    /// The SQL statement to execute
    sql: Option<String>,

    /// Cluster node address (host:port)
    #[arg(short, long, env = "IGNITE_SERVERS")]
    servers: Option<String>,

    /// Fixed transport URL, bypassing address-based URL building
    #[arg(long, env = "IGNITEWORKS_URL")]
    url: Option<String>,

    /// Transport URL scheme used with --servers
    #[arg(long, default_value = "postgres")]
    driver: String,

    /// Database appended to the transport URL
    #[arg(long)]
    database: Option<String>,

    /// Username for cluster authentication
    #[arg(short, long)]
    user: Option<String>,

    /// Password for cluster authentication
    #[arg(long, env = "IGNITE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Parameter literals for one execution, e.g. "42, 'Ada', true"
    #[arg(short, long)]
    bind: Option<String>,

    /// One parameter set per occurrence; runs a batch execution
    #[arg(long)]
    bulk: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Config file (defaults to ./igniteworks.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables
    Tables {
        #[arg(long)]
        schema: Option<String>,
    },
    /// List caches (schemas)
    Caches,
    /// Describe the columns of a table
    Columns {
        table: String,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Show the primary key of a table
    Keys {
        table: String,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Show the remote type mapping
    Types,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "igniteworks=debug"
    } else {
        "igniteworks=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(Commands::Types) = cli.command {
        show_types();
        return Ok(());
    }

    if cli.command.is_none() && cli.sql.is_none() {
        println!("{}", "igniteworks: SQL client for cache clusters".cyan().bold());
        println!();
        println!("Usage: igniteworks <SQL> [OPTIONS]");
        println!();
        println!("Try: igniteworks --help");
        return Ok(());
    }

    let options = resolve_options(cli)?;
    let connector = match &cli.url {
        Some(url) => SqlxConnector::url(url.clone()),
        None => {
            let connector = SqlxConnector::new(cli.driver.clone());
            match &cli.database {
                Some(db) => connector.database(db.clone()),
                None => connector,
            }
        }
    };

    if cli.verbose {
        println!(
            "{} {}",
            "Connecting to:".dimmed(),
            options.servers.as_deref().unwrap_or("-")
        );
    }

    let conn = Connection::open(&connector, options).context("Connection failed")?;
    conn.scope(|conn| -> Result<()> {
        match &cli.command {
            Some(Commands::Tables { schema }) => {
                let tables = Inspector::new(conn).get_table_names(schema.as_deref())?;
                print_names(&tables, "table(s)", &cli.format)
            }
            Some(Commands::Caches) => {
                let caches = Inspector::new(conn).get_schema_names()?;
                print_names(&caches, "cache(s)", &cli.format)
            }
            Some(Commands::Columns { table, schema }) => {
                let columns = Inspector::new(conn).get_columns(table, schema.as_deref())?;
                print_columns(&columns, &cli.format)
            }
            Some(Commands::Keys { table, schema }) => {
                let pk = Inspector::new(conn).get_pk_constraint(table, schema.as_deref())?;
                match cli.format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pk)?),
                    OutputFormat::Table => {
                        println!("{} ({})", pk.name.cyan(), pk.constrained_columns.join(", "))
                    }
                }
                Ok(())
            }
            Some(Commands::Types) => Ok(()),
            None => match &cli.sql {
                Some(sql) => execute_statement(conn, sql, cli),
                None => Ok(()),
            },
        }
    })
}

/// Config file first, then command line overrides.
fn resolve_options(cli: &Cli) -> Result<ConnectOptions> {
    let mut options = config::load(cli.config.as_deref())?;

    if let Some(servers) = &cli.servers {
        options.servers = Some(servers.clone());
    }
    if cli.user.is_some() {
        options.credentials.username = cli.user.clone();
    }
    if cli.password.is_some() {
        options.credentials.password = cli.password.clone();
    }

    // A fixed URL still needs an address for the connection itself.
    if options.servers.is_none() {
        if let Some(url) = &cli.url {
            let host = parser::parse_url(url)
                .ok()
                .and_then(|parts| parts.host.map(|h| (h, parts.port)));
            options.servers = Some(match host {
                Some((host, port)) => format!("{}:{}", host, port.unwrap_or(DEFAULT_PORT)),
                None => format!("localhost:{}", DEFAULT_PORT),
            });
        }
    }

    Ok(options)
}

fn execute_statement(conn: &Connection, sql: &str, cli: &Cli) -> Result<()> {
    if cli.verbose {
        println!("{} {}", "SQL:".dimmed(), sql.yellow());
    }

    let mut cursor = conn.cursor()?;

    if !cli.bulk.is_empty() {
        let sets = cli
            .bulk
            .iter()
            .map(|set| parser::parse_literals(set))
            .collect::<IgniteResult<Vec<_>>>()?;

        let results = cursor.execute_many(sql, &sets)?;
        for (i, result) in results.iter().enumerate() {
            println!(
                "  {} set {}: {} row(s)",
                "→".dimmed(),
                i + 1,
                result.rowcount
            );
        }
        println!(
            "{} {} rows affected in {} ms",
            "✓".green(),
            cursor.row_count(),
            cursor.duration()
        );
        return Ok(());
    }

    match &cli.bind {
        Some(bind) => {
            let params = parser::parse_literals(bind)?;
            if cli.verbose {
                println!("{}", "Bindings:".cyan());
                for (i, p) in params.iter().enumerate() {
                    println!("  ?{} = {}", i + 1, p.to_string().yellow());
                }
            }
            cursor.execute_with(sql, &params)?;
        }
        None => cursor.execute(sql)?,
    }

    let columns: Vec<String> = cursor
        .description()
        .unwrap_or_default()
        .into_iter()
        .map(|d| d.name)
        .collect();

    if columns.is_empty() && parser::statement_kind(sql) == parser::StatementKind::Update {
        println!("{} {} rows affected", "✓".green(), cursor.row_count());
    } else {
        let rows = cursor.fetch_all()?;
        format_output(&columns, &rows, &cli.format)?;
    }

    if cli.verbose && cursor.duration() >= 0 {
        println!("{} {} ms", "Duration:".dimmed(), cursor.duration());
    }
    cursor.close();
    Ok(())
}

fn format_output(columns: &[String], rows: &[Row], format: &OutputFormat) -> Result<()> {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", rows_to_json(columns, rows)?),
        OutputFormat::Table => {
            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|row| row.iter().map(Value::to_string).collect())
                .collect();
            print_table(columns, &cells);

            println!();
            println!("{} row(s) returned", rows.len().to_string().cyan());
        }
    }
    Ok(())
}

/// One row as a JSON object, keys in column order. Repeated column names
/// are written as repeated keys.
struct JsonRow<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.row.len()))?;
        for (column, value) in self.columns.iter().zip(self.row) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

fn rows_to_json(columns: &[String], rows: &[Row]) -> serde_json::Result<String> {
    let objects: Vec<JsonRow> = rows.iter().map(|row| JsonRow { columns, row }).collect();
    serde_json::to_string_pretty(&objects)
}

fn print_table(columns: &[String], cells: &[Vec<String>]) {
    // Calculate column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    // Print header
    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:width$}", c, width = *w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    // Print separator
    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    // Print rows
    for row in cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:width$}", v, width = *w))
            .collect();
        println!("{}", line.join(" │ "));
    }
}

fn print_names(names: &[String], noun: &str, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(names)?),
        OutputFormat::Table => {
            for name in names {
                println!("  {} {}", "•".cyan(), name);
            }
            println!("{} {}", names.len().to_string().cyan(), noun);
        }
    }
    Ok(())
}

fn print_columns(columns: &[igniteworks::dialect::ColumnInfo], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(columns)?),
        OutputFormat::Table => {
            let headers = ["name".to_string(), "type".to_string(), "nullable".to_string()];
            let cells: Vec<Vec<String>> = columns
                .iter()
                .map(|c| vec![c.name.clone(), c.sql_type.to_string(), c.nullable.to_string()])
                .collect();
            print_table(&headers, &cells);
        }
    }
    Ok(())
}

fn show_types() {
    println!("{}", "Remote Type Mapping".cyan().bold());
    println!();
    println!(
        "{:24} {}",
        "Remote type".white().bold(),
        "SQL type".white().bold()
    );
    println!("{}", "─".repeat(40).dimmed());

    for (remote, tag) in TYPE_MAP {
        println!("{:24} {}", remote.yellow(), tag.sql_name().cyan());
    }
    println!(
        "{:24} {}",
        "(anything else)".dimmed(),
        SqlType::UserDefined.sql_name().dimmed()
    );
}
