//! # igniteworks
//!
//! A DB-API style client and reflection dialect for the SQL endpoint of a
//! distributed cache cluster.
//!
//! The crate owns connection and cursor bookkeeping, error mapping and
//! schema reflection. Talking to the cluster is delegated to a
//! [`transport::Connector`].
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use igniteworks::prelude::*;
//!
//! let connector = SqlxConnector::new("postgres");
//! let conn = Connection::open(&connector, ConnectOptions::new("10.0.0.5:10800"))?;
//!
//! let mut cursor = conn.cursor()?;
//! cursor.execute("SELECT name, val FROM T")?;
//! for row in cursor.fetch_all()? {
//!     println!("{:?}", row);
//! }
//! ```
//!
//! ## Lifecycle
//!
//! | Call                     | Open               | Closed             |
//! |--------------------------|--------------------|--------------------|
//! | `Connection::cursor`     | new cursor         | `ConnectionClosed` |
//! | `Connection::commit`     | no-op              | `ConnectionClosed` |
//! | `Cursor::execute`        | stores result      | `CursorClosed`     |
//! | `Cursor::fetch_*`        | rows / `NoResult`  | `CursorClosed`     |
//! | `close`                  | closes             | no-op              |

pub mod config;
pub mod connection;
pub mod cursor;
pub mod dialect;
pub mod error;
pub mod parser;
pub mod transport;
pub mod types;
pub mod value;

pub use connection::{connect, Connection};
pub use cursor::{ColumnDescription, Cursor};
pub use error::{ErrorClass, IgniteError, IgniteResult};
pub use value::{Row, Value};

pub mod prelude {
    pub use crate::config::{ConnectOptions, Credentials, Endpoint, TlsOptions};
    pub use crate::connection::{connect, Connection};
    pub use crate::cursor::{ColumnDescription, Cursor};
    pub use crate::dialect::{Dialect, IgniteDialect, Inspector};
    pub use crate::error::*;
    pub use crate::transport::{Connector, QueryResult, SqlExecutor, SqlxConnector, StatementResult};
    pub use crate::types::SqlType;
    pub use crate::value::{Row, Value};
}
