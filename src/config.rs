//! Connection configuration.
//!
//! Options can be built in code, parsed from a connection URL, or loaded from
//! a TOML file:
//!
//! ```toml
//! [connection]
//! servers = "10.0.0.5:10800"
//! timeout = 30.0
//! handshake_timeout = 10.0
//!
//! [connection.credentials]
//! username = "ignite"
//! password = "ignite"
//!
//! [connection.tls]
//! cert_reqs = "required"
//! ca_certfile = "/etc/ignite/ca.pem"
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IgniteError, IgniteResult};
use crate::parser;

/// Port of the cluster's thin-client connector.
pub const DEFAULT_PORT: u16 = 10800;

/// Default time allowed for the connection handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "igniteworks.toml";

/// A resolved cluster node address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum TlsVersion {
    #[serde(rename = "tls1.1")]
    Tls11,
    #[default]
    #[serde(rename = "tls1.2")]
    Tls12,
    #[serde(rename = "tls1.3")]
    Tls13,
}

/// How the server certificate is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CertReqs {
    /// Certificate is ignored.
    #[default]
    None,
    /// Certificate is validated if provided.
    Optional,
    /// A valid certificate is required.
    Required,
}

/// TLS settings for the transport.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// Force TLS on or off. Unset means "on when credentials are supplied".
    pub use_ssl: Option<bool>,
    pub version: Option<TlsVersion>,
    pub ciphers: Option<String>,
    pub cert_reqs: CertReqs,
    /// Client key identifying the local party.
    pub keyfile: Option<PathBuf>,
    pub keyfile_password: Option<String>,
    /// Client certificate identifying the local party.
    pub certfile: Option<PathBuf>,
    /// Trusted certificate or chain used to check the server.
    pub ca_certfile: Option<PathBuf>,
}

/// Cluster authentication.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    /// Both username and password are present.
    pub fn is_complete(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Everything needed to open a connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// `host:port` of a cluster node.
    pub servers: Option<String>,

    /// Timeout for each socket operation. `None` blocks.
    #[serde(deserialize_with = "de::opt_seconds")]
    pub timeout: Option<Duration>,

    /// Timeout for the connection handshake.
    #[serde(deserialize_with = "de::seconds")]
    pub handshake_timeout: Duration,

    pub tls: TlsOptions,

    pub credentials: Credentials,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            servers: None,
            timeout: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            tls: TlsOptions::default(),
            credentials: Credentials::default(),
        }
    }
}

impl ConnectOptions {
    /// Options for a single server address.
    pub fn new(servers: impl Into<String>) -> Self {
        Self {
            servers: Some(servers.into()),
            ..Self::default()
        }
    }

    /// Parse `igniteworks://[user[:password]@]host[:port]`.
    ///
    /// A missing port falls back to [`DEFAULT_PORT`].
    pub fn from_url(url: &str) -> IgniteResult<Self> {
        let parts = parser::parse_url(url)?;
        let host = parts
            .host
            .ok_or_else(|| IgniteError::Config(format!("No host in connection URL '{}'", url)))?;

        let mut options = Self::new(format!("{}:{}", host, parts.port.unwrap_or(DEFAULT_PORT)));
        options.credentials = Credentials {
            username: parts.username,
            password: parts.password,
        };
        Ok(options)
    }

    /// Set the server address.
    pub fn servers(mut self, servers: impl Into<String>) -> Self {
        self.servers = Some(servers.into());
        self
    }

    /// Set the per-operation socket timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials {
            username: Some(username.into()),
            password: Some(password.into()),
        };
        self
    }

    /// Replace the TLS settings.
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Whether the transport should negotiate TLS.
    pub fn use_ssl(&self) -> bool {
        self.tls
            .use_ssl
            .unwrap_or_else(|| self.credentials.is_complete())
    }

    /// Validate and split the server address.
    ///
    /// Fails with a configuration error when no address was supplied.
    pub fn endpoint(&self) -> IgniteResult<Endpoint> {
        match self.servers.as_deref().map(str::trim) {
            Some(servers) if !servers.is_empty() => parser::parse_address(servers),
            _ => Err(IgniteError::Config("No connection url provided.".into())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    connection: ConnectOptions,
}

/// Load options from a TOML file.
pub fn load_file(path: &Path) -> IgniteResult<ConnectOptions> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IgniteError::Config(format!("Cannot read {}: {}", path.display(), e))
    })?;
    from_toml(&content)
        .map_err(|e| IgniteError::Config(format!("Invalid {}: {}", path.display(), e)))
}

/// Parse options from TOML text.
pub fn from_toml(content: &str) -> Result<ConnectOptions, toml::de::Error> {
    let file: ConfigFile = toml::from_str(content)?;
    Ok(file.connection)
}

/// Default config file locations, in lookup order.
pub fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("igniteworks").join("config.toml"));
    }
    paths
}

/// Load options from an explicit path, or the first default file that exists.
///
/// No file at all yields default options.
pub fn load(path: Option<&Path>) -> IgniteResult<ConnectOptions> {
    if let Some(path) = path {
        return load_file(path);
    }
    match default_paths().into_iter().find(|p| p.exists()) {
        Some(found) => {
            tracing::debug!(path = %found.display(), "loading config file");
            load_file(&found)
        }
        None => Ok(ConnectOptions::default()),
    }
}

mod de {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }

    pub fn opt_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        match Option::<f64>::deserialize(d)? {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_required() {
        let err = ConnectOptions::default().endpoint().unwrap_err();
        assert!(matches!(err, IgniteError::Config(_)));

        let err = ConnectOptions::new("   ").endpoint().unwrap_err();
        assert!(err.is_config());

        let ep = ConnectOptions::new("10.0.0.5:10800").endpoint().unwrap();
        assert_eq!(ep.to_string(), "10.0.0.5:10800");
    }

    #[test]
    fn test_use_ssl_default_follows_credentials() {
        let opts = ConnectOptions::new("h:1");
        assert!(!opts.use_ssl());

        let opts = opts.credentials("ignite", "ignite");
        assert!(opts.use_ssl());

        let opts = opts.tls(TlsOptions {
            use_ssl: Some(false),
            ..TlsOptions::default()
        });
        assert!(!opts.use_ssl());
    }

    #[test]
    fn test_from_url() {
        let opts = ConnectOptions::from_url("igniteworks://ignite:pw@node1").unwrap();
        assert_eq!(opts.servers.as_deref(), Some("node1:10800"));
        assert_eq!(opts.credentials.username.as_deref(), Some("ignite"));
        assert!(opts.use_ssl());

        assert!(ConnectOptions::from_url("igniteworks://").is_err());
    }

    #[test]
    fn test_from_toml() {
        let opts = from_toml(
            r#"
            [connection]
            servers = "10.0.0.5:10800"
            timeout = 2.5

            [connection.credentials]
            username = "ignite"

            [connection.tls]
            cert_reqs = "required"
            version = "tls1.3"
            "#,
        )
        .unwrap();

        assert_eq!(opts.servers.as_deref(), Some("10.0.0.5:10800"));
        assert_eq!(opts.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(opts.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(opts.tls.cert_reqs, CertReqs::Required);
        assert_eq!(opts.tls.version, Some(TlsVersion::Tls13));
        assert!(!opts.use_ssl());
    }

    #[test]
    fn test_from_toml_empty() {
        let opts = from_toml("").unwrap();
        assert!(opts.servers.is_none());
        assert!(from_toml("[connection]\ntimeout = -1.0").is_err());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let opts = ConnectOptions::new("h:1").credentials("u", "hunter2");
        assert!(!format!("{:?}", opts).contains("hunter2"));
    }
}
