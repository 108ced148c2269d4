//! Client configuration.
//!
//! A [`Config`] can be built three ways that all end in the same struct:
//!
//! ```rust,ignore
//! let a = Config::new().host("db1").port(1433).username("sa").password("pw");
//! let b = Config::from_pairs([("hostname", "db1"), ("username", "sa"), ("password", "pw")])?;
//! let c = Config::from_connection_string("Server=db1,1433;User Id=sa;Password=pw")?;
//! ```

use std::fmt;
use std::time::Duration;

use encoding_rs::Encoding;
use tds_protocol::packet::{MAX_PACKET_SIZE, MIN_PACKET_SIZE};
use tds_protocol::version::TdsVersion;

use crate::directory::ServerDirectory;
use crate::error::{Error, Result};

/// Port used when neither the config nor the directory names one.
pub const DEFAULT_PORT: u16 = 1433;

/// Client character set used when none is configured.
pub const DEFAULT_CHARSET: &str = "ISO-8859-1";

/// Timeout configuration for the connection phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Time to establish the TCP connection (default: 15s).
    pub connect_timeout: Duration,
    /// Time to complete PRELOGIN and LOGIN7 (default: 30s).
    pub login_timeout: Duration,
    /// Time allowed for each statement execution (default: 30s).
    pub command_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            login_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TCP connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the login timeout.
    #[must_use]
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Set the statement execution timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Configuration for connecting to a server.
///
/// Exactly one of `servername` (an alias looked up in the
/// [`ServerDirectory`]) or `hostname` must be set. When both are set the
/// hostname is dialed and the servername is only sent in LOGIN7.
#[derive(Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    /// Directory alias.
    pub servername: Option<String>,
    /// Host name or IP address.
    pub hostname: Option<String>,
    /// TCP port; requires `hostname`.
    pub port: Option<u16>,
    /// Login name.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Initial database.
    pub database: Option<String>,
    /// Application name shown by the server.
    pub app_name: Option<String>,
    /// Client character set for non-Unicode text without a collation.
    pub charset: Option<String>,
    /// Requested TDS version.
    pub tds_version: Option<TdsVersion>,
    /// Requested packet size.
    pub packet_size: Option<u32>,
    /// Issued as `SET TEXTSIZE` after login.
    pub text_size: Option<u32>,
    /// Phase timeouts.
    pub timeouts: TimeoutConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("servername", &self.servername)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("app_name", &self.app_name)
            .field("charset", &self.charset)
            .field("tds_version", &self.tds_version)
            .field("packet_size", &self.packet_size)
            .field("text_size", &self.text_size)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Config {
    /// Create a new configuration with nothing set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from string key/value pairs.
    ///
    /// Keys are case-insensitive, may carry a leading `:`, and treat `_`,
    /// `-` and spaces alike, so `:host_name`, `Host Name` and `host-name`
    /// are one key. Unknown keys are ignored.
    ///
    /// | Key | Aliases |
    /// |-----|---------|
    /// | `servername` | `dataserver` |
    /// | `hostname` | `host`, `server`, `data source` (`host,port` accepted) |
    /// | `port` | |
    /// | `username` | `user`, `user id`, `uid` |
    /// | `password` | `pwd` |
    /// | `database` | `initial catalog` |
    /// | `appname` | `app`, `application name` |
    /// | `charset` | `client charset` |
    /// | `tds_version` | `tds version`, `tdsver` |
    /// | `packet_size` | |
    /// | `text_size` | `textsize` |
    /// | `login_timeout` | seconds |
    /// | `connect_timeout` | seconds |
    /// | `timeout` | `command timeout`, seconds |
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Parse a `key=value;...` connection string.
    ///
    /// Keys follow the same rules as [`Config::from_pairs`]:
    /// ```text
    /// Server=localhost,1433;Database=test;User Id=sa;Password=secret;
    /// ```
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("invalid key-value: {part}")))?;
            pairs.push((key.trim(), value.trim()));
        }
        Self::from_pairs(pairs)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let key = normalize_key(key);
        let value = value.trim();

        match key.as_str() {
            "servername" | "server_name" | "dataserver" => {
                self.servername = Some(value.to_string());
            }
            "hostname" | "host_name" | "host" | "server" | "data_source" | "address" => {
                // host,port as in ADO.NET connection strings
                if let Some((host, port)) = value.split_once(',') {
                    self.hostname = Some(host.trim().to_string());
                    self.port = Some(parse_number(port.trim(), "port")?);
                } else {
                    self.hostname = Some(value.to_string());
                }
            }
            "port" => self.port = Some(parse_number(value, "port")?),
            "username" | "user_name" | "user" | "user_id" | "uid" => {
                self.username = Some(value.to_string());
            }
            "password" | "pwd" => self.password = Some(value.to_string()),
            "database" | "initial_catalog" | "db" => self.database = Some(value.to_string()),
            "appname" | "app_name" | "app" | "application_name" => {
                self.app_name = Some(value.to_string());
            }
            "charset" | "client_charset" | "encoding" => self.charset = Some(value.to_string()),
            "tds_version" | "tdsversion" | "tdsver" => {
                self.tds_version = Some(parse_tds_version(value)?);
            }
            "packet_size" | "packetsize" => self.packet_size = Some(parse_number(value, "packet size")?),
            "text_size" | "textsize" => self.text_size = Some(parse_number(value, "text size")?),
            "login_timeout" => {
                self.timeouts.login_timeout = Duration::from_secs(parse_number(value, "timeout")?);
            }
            "connect_timeout" | "connection_timeout" => {
                self.timeouts.connect_timeout =
                    Duration::from_secs(parse_number(value, "timeout")?);
            }
            "timeout" | "command_timeout" => {
                self.timeouts.command_timeout =
                    Duration::from_secs(parse_number(value, "timeout")?);
            }
            _ => {
                // Ignore unknown options for forward compatibility
                tracing::debug!(key = %key, "ignoring unknown configuration option");
            }
        }
        Ok(())
    }

    /// Set the directory alias.
    #[must_use]
    pub fn servername(mut self, servername: impl Into<String>) -> Self {
        self.servername = Some(servername.into());
        self
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.hostname = Some(host.into());
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the login name.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the client character set, e.g. `UTF-8` or `CP1252`.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Set the TDS protocol version.
    #[must_use]
    pub fn tds_version(mut self, version: TdsVersion) -> Self {
        self.tds_version = Some(version);
        self
    }

    /// Set the requested packet size.
    #[must_use]
    pub fn packet_size(mut self, size: u32) -> Self {
        self.packet_size = Some(size);
        self
    }

    /// Set the text size issued after login.
    #[must_use]
    pub fn text_size(mut self, size: u32) -> Self {
        self.text_size = Some(size);
        self
    }

    /// Set the TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect_timeout = timeout;
        self
    }

    /// Set the login timeout.
    #[must_use]
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.login_timeout = timeout;
        self
    }

    /// Set the statement timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.command_timeout = timeout;
        self
    }

    /// Replace all timeouts.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Check the configuration without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.servername.is_none() && self.hostname.is_none() {
            return Err(Error::Config(
                "either servername or hostname must be set".into(),
            ));
        }
        if self.port.is_some() && self.hostname.is_none() {
            return Err(Error::Config("port requires hostname".into()));
        }
        if self.username.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Config("username must be set".into()));
        }
        if let Some(ref charset) = self.charset {
            lookup_charset(charset)?;
        }
        if let Some(size) = self.packet_size {
            let range = MIN_PACKET_SIZE as u32..=MAX_PACKET_SIZE as u32;
            if !range.contains(&size) {
                return Err(Error::Config(format!(
                    "packet size {size} outside {}..={}",
                    range.start(),
                    range.end()
                )));
            }
        }
        Ok(())
    }

    /// Resolve the endpoint and effective settings.
    ///
    /// Explicit values win over directory values; the directory's
    /// `[global]` section applies when no alias matches.
    pub(crate) fn resolve(&self, directory: Option<&ServerDirectory>) -> Result<Endpoint> {
        self.validate()?;

        let entry = match (&self.servername, directory) {
            (Some(alias), Some(dir)) => dir.lookup(alias).unwrap_or_else(|| dir.global().clone()),
            (None, Some(dir)) => dir.global().clone(),
            (_, None) => Default::default(),
        };

        let (host, port) = match (&self.hostname, &self.servername) {
            (Some(host), _) => (host.clone(), self.port.unwrap_or(DEFAULT_PORT)),
            (None, Some(alias)) => {
                if entry.host.is_none() {
                    tracing::debug!(alias = %alias, "alias not in server directory, using as host");
                }
                (
                    entry.host.clone().unwrap_or_else(|| alias.clone()),
                    entry.port.unwrap_or(DEFAULT_PORT),
                )
            }
            (None, None) => return Err(Error::Config("no server address".into())),
        };

        let tds_version = match (self.tds_version, entry.tds_version.as_deref()) {
            (Some(version), _) => version,
            (None, Some(raw)) => parse_tds_version(raw)?,
            (None, None) => TdsVersion::default(),
        };

        let charset_name = self
            .charset
            .as_deref()
            .or(entry.client_charset.as_deref())
            .unwrap_or(DEFAULT_CHARSET);

        Ok(Endpoint {
            server_name: self.servername.clone().unwrap_or_else(|| host.clone()),
            host,
            port,
            tds_version,
            charset: lookup_charset(charset_name)?,
            text_size: self.text_size.or(entry.text_size),
        })
    }
}

/// Effective connection target after directory lookup.
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) server_name: String,
    pub(crate) tds_version: TdsVersion,
    pub(crate) charset: &'static Encoding,
    pub(crate) text_size: Option<u32>,
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .trim_start_matches(':')
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid {what}: {value}")))
}

fn parse_tds_version(value: &str) -> Result<TdsVersion> {
    TdsVersion::parse(value).ok_or_else(|| {
        Error::Config(format!(
            "invalid TDS version: {value}. Supported values: 7.0, 7.1, 7.2, 7.3, 7.4"
        ))
    })
}

/// Look up a character set by name.
pub(crate) fn lookup_charset(name: &str) -> Result<&'static Encoding> {
    Encoding::for_label(name.trim().as_bytes())
        .ok_or_else(|| Error::Config(format!("unknown charset: {name}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config::new().username("sa").password("secret")
    }

    #[test]
    fn test_connection_string_parsing() {
        let config = Config::from_connection_string(
            "Server=localhost;Database=test;User Id=sa;Password=secret;",
        )
        .unwrap();

        assert_eq!(config.hostname.as_deref(), Some("localhost"));
        assert_eq!(config.database.as_deref(), Some("test"));
        assert_eq!(config.username.as_deref(), Some("sa"));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_connection_string_with_port() {
        let config = Config::from_connection_string("Server=db1,1500;User Id=sa").unwrap();
        assert_eq!(config.hostname.as_deref(), Some("db1"));
        assert_eq!(config.port, Some(1500));
    }

    #[test]
    fn test_connection_string_rejects_bare_key() {
        assert!(matches!(
            Config::from_connection_string("Server=db1;oops"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_pair_key_spellings() {
        let config = Config::from_pairs([
            (":host_name", "h"),
            ("User-Name", "u"),
            ("TDS Version", "7.2"),
            ("login_timeout", "5"),
            ("timeout", "7"),
        ])
        .unwrap();
        assert_eq!(config.hostname.as_deref(), Some("h"));
        assert_eq!(config.username.as_deref(), Some("u"));
        assert_eq!(config.tds_version, Some(TdsVersion::V7_2));
        assert_eq!(config.timeouts.login_timeout, Duration::from_secs(5));
        assert_eq!(config.timeouts.command_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_pairs_reject_bad_values() {
        assert!(Config::from_pairs([("port", "http")]).is_err());
        assert!(Config::from_pairs([("tds_version", "9.9")]).is_err());
    }

    #[test]
    fn test_validate_requires_address() {
        let err = base().validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_port_requires_hostname() {
        let err = base().servername("alias").port(1433).validate().unwrap_err();
        assert!(err.to_string().contains("port requires hostname"));
    }

    #[test]
    fn test_validate_requires_username() {
        let err = Config::new().host("h").validate().unwrap_err();
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_validate_charset_and_packet_size() {
        assert!(base().host("h").charset("klingon").validate().is_err());
        assert!(base().host("h").charset("UTF-8").validate().is_ok());
        assert!(base().host("h").packet_size(100).validate().is_err());
    }

    #[test]
    fn test_resolve_hostname_defaults() {
        let endpoint = base().host("db1").resolve(None).unwrap();
        assert_eq!(endpoint.host, "db1");
        assert_eq!(endpoint.port, DEFAULT_PORT);
        assert_eq!(endpoint.server_name, "db1");
        assert_eq!(endpoint.tds_version, TdsVersion::V7_4);
        assert_eq!(endpoint.charset, encoding_rs::WINDOWS_1252);
        assert_eq!(endpoint.text_size, None);
    }

    #[test]
    fn test_resolve_alias_through_directory() {
        let dir = ServerDirectory::parse(
            "[global]\ntext size = 1000\n[reports]\nhost = 10.0.0.5\nport = 1500\ntds version = 7.1\n",
        );
        let endpoint = base().servername("reports").resolve(Some(&dir)).unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, 1500);
        assert_eq!(endpoint.server_name, "reports");
        assert_eq!(endpoint.tds_version, TdsVersion::V7_1);
        assert_eq!(endpoint.text_size, Some(1000));
    }

    #[test]
    fn test_resolve_explicit_values_override_directory() {
        let dir = ServerDirectory::parse("[reports]\nhost = 10.0.0.5\ntext size = 1000\n");
        let endpoint = base()
            .servername("reports")
            .text_size(5)
            .tds_version(TdsVersion::V7_3A)
            .resolve(Some(&dir))
            .unwrap();
        assert_eq!(endpoint.text_size, Some(5));
        assert_eq!(endpoint.tds_version, TdsVersion::V7_3A);
    }

    #[test]
    fn test_resolve_unknown_alias_is_host() {
        let endpoint = base()
            .servername("db9")
            .resolve(Some(&ServerDirectory::empty()))
            .unwrap();
        assert_eq!(endpoint.host, "db9");
        assert_eq!(endpoint.port, DEFAULT_PORT);
    }

    #[test]
    fn test_resolve_rejects_bad_directory_version() {
        let dir = ServerDirectory::parse("[x]\ntds version = 42\n");
        assert!(matches!(
            base().servername("x").resolve(Some(&dir)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", base());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_timeout_defaults() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.connect_timeout, Duration::from_secs(15));
        assert_eq!(timeouts.login_timeout, Duration::from_secs(30));
        assert_eq!(timeouts.command_timeout, Duration::from_secs(30));
        let timeouts = timeouts.with_command_timeout(Duration::from_secs(1));
        assert_eq!(timeouts.command_timeout, Duration::from_secs(1));
    }
}
