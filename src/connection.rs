//! Connection state machine.
//!
//! A [`Connection`] owns one transport session and hands out [`Cursor`]s.
//! Once closed it stays closed: every operation except [`Connection::close`]
//! and [`Connection::is_closed`] fails with [`IgniteError::ConnectionClosed`].
//!
//! A connection is not `Sync`. Callers sharing one across threads must
//! serialize access themselves.

use std::cell::{Cell, RefCell};
use std::fmt;

use crate::config::{ConnectOptions, Endpoint};
use crate::cursor::Cursor;
use crate::error::{IgniteError, IgniteResult};
use crate::transport::{Connector, QueryResult, SqlExecutor};
use crate::value::Value;

/// An open session to a cluster node.
///
/// Dropping a connection closes it, so a plain Rust scope is already a
/// scoped acquisition. [`Connection::scope`] makes that explicit.
///
/// # Example
///
/// ```rust,ignore
/// let conn = Connection::open(&connector, ConnectOptions::new("10.0.0.5:10800"))?;
/// let mut cursor = conn.cursor()?;
/// cursor.execute("SELECT * FROM T")?;
/// let rows = cursor.fetch_all()?;
/// ```
pub struct Connection {
    endpoint: Endpoint,
    session: RefCell<Box<dyn SqlExecutor>>,
    closed: Cell<bool>,
}

impl Connection {
    /// Validate the address and open a session through `connector`.
    ///
    /// A missing or malformed address fails with a configuration error
    /// before the connector is touched.
    pub fn open<C: Connector + ?Sized>(connector: &C, options: ConnectOptions) -> IgniteResult<Self> {
        let endpoint = options.endpoint()?;
        let session = connector.open(&endpoint, &options)?;
        tracing::debug!(%endpoint, "connection opened");

        Ok(Self {
            endpoint,
            session: RefCell::new(session),
            closed: Cell::new(false),
        })
    }

    /// A new cursor bound to this connection.
    pub fn cursor(&self) -> IgniteResult<Cursor<'_>> {
        self.ensure_open()?;
        Ok(Cursor::new(self))
    }

    /// Close the connection and release the transport. Idempotent.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.session.borrow_mut().close();
        tracing::debug!(endpoint = %self.endpoint, "connection closed");
    }

    /// Transactions are not supported; this only checks the connection is open.
    pub fn commit(&self) -> IgniteResult<()> {
        self.ensure_open()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// The node this connection talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run `f` with this connection, then close it.
    ///
    /// The connection is closed on every exit path: a normal return, an
    /// `Err` returned by `f`, or a panic unwinding through it (via `Drop`).
    pub fn scope<R>(self, f: impl FnOnce(&Connection) -> R) -> R {
        let out = f(&self);
        self.close();
        out
    }

    /// Run a statement on the session. Used by cursors.
    pub(crate) fn execute_sql(
        &self,
        sql: &str,
        parameters: Option<&[Value]>,
        bulk_parameters: Option<&[Vec<Value>]>,
    ) -> IgniteResult<QueryResult> {
        self.ensure_open()?;
        self.session
            .borrow_mut()
            .execute_sql(sql, parameters, bulk_parameters)
    }

    fn ensure_open(&self) -> IgniteResult<()> {
        if self.closed.get() {
            Err(IgniteError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.closed.get())
            .finish()
    }
}

/// Open a connection. Shorthand for [`Connection::open`].
pub fn connect<C: Connector + ?Sized>(connector: &C, options: ConnectOptions) -> IgniteResult<Connection> {
    Connection::open(connector, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[derive(Default)]
    struct Probe {
        opened: Cell<usize>,
        closed: Cell<usize>,
    }

    struct ProbeConnector(Rc<Probe>);

    struct ProbeSession(Rc<Probe>);

    impl SqlExecutor for ProbeSession {
        fn execute_sql(
            &mut self,
            _sql: &str,
            _parameters: Option<&[Value]>,
            _bulk: Option<&[Vec<Value>]>,
        ) -> IgniteResult<QueryResult> {
            Ok(QueryResult::with_rowcount(0))
        }

        fn close(&mut self) {
            self.0.closed.set(self.0.closed.get() + 1);
        }
    }

    impl Connector for ProbeConnector {
        fn open(
            &self,
            _endpoint: &Endpoint,
            _options: &ConnectOptions,
        ) -> IgniteResult<Box<dyn SqlExecutor>> {
            self.0.opened.set(self.0.opened.get() + 1);
            Ok(Box::new(ProbeSession(self.0.clone())))
        }
    }

    fn probe() -> (Rc<Probe>, ProbeConnector) {
        let probe = Rc::new(Probe::default());
        (probe.clone(), ProbeConnector(probe))
    }

    #[test]
    fn test_missing_address_never_reaches_transport() {
        let (probe, connector) = probe();
        let err = Connection::open(&connector, ConnectOptions::default()).unwrap_err();
        assert!(matches!(err, IgniteError::Config(_)));

        let err = Connection::open(&connector, ConnectOptions::new("nohost")).unwrap_err();
        assert!(err.is_config());
        assert_eq!(probe.opened.get(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (probe, connector) = probe();
        let conn = Connection::open(&connector, ConnectOptions::new("10.0.0.5:10800")).unwrap();
        assert_eq!(conn.endpoint().port, 10800);
        assert!(!conn.is_closed());
        conn.commit().unwrap();

        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert!(matches!(conn.commit(), Err(IgniteError::ConnectionClosed)));
        assert!(matches!(conn.cursor(), Err(IgniteError::ConnectionClosed)));

        drop(conn);
        assert_eq!(probe.closed.get(), 1);
    }

    #[test]
    fn test_drop_closes_session() {
        let (probe, connector) = probe();
        {
            let _conn = connect(&connector, ConnectOptions::new("h:1")).unwrap();
        }
        assert_eq!(probe.closed.get(), 1);
    }
}
