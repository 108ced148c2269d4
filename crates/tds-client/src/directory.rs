//! Server alias directory in the `freetds.conf` format.
//!
//! ```text
//! [global]
//!     tds version = 7.3
//!     text size = 64512
//!
//! [reports]
//!     host = db1.example.com
//!     port = 1433
//!     client charset = UTF-8
//! ```
//!
//! Section names and keys are case-insensitive and spaces inside keys are
//! ignored, so `TDS Version` and `tdsversion` are the same key. Values from
//! `[global]` apply to every alias unless the alias sets them itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming an explicit directory file.
pub const CONFIG_ENV_VAR: &str = "FREETDSCONF";

const GLOBAL_SECTION: &str = "global";

/// Settings for one alias, or the `[global]` defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerEntry {
    /// Host name or address.
    pub host: Option<String>,
    /// TCP port.
    pub port: Option<u16>,
    /// TDS version as written, e.g. `7.3`.
    pub tds_version: Option<String>,
    /// Value for `SET TEXTSIZE`.
    pub text_size: Option<u32>,
    /// Client character set name.
    pub client_charset: Option<String>,
}

impl ServerEntry {
    /// Fill every unset field from `defaults`.
    #[must_use]
    pub fn or(self, defaults: &ServerEntry) -> Self {
        Self {
            host: self.host.or_else(|| defaults.host.clone()),
            port: self.port.or(defaults.port),
            tds_version: self.tds_version.or_else(|| defaults.tds_version.clone()),
            text_size: self.text_size.or(defaults.text_size),
            client_charset: self
                .client_charset
                .or_else(|| defaults.client_charset.clone()),
        }
    }
}

/// Parsed alias directory.
#[derive(Debug, Clone, Default)]
pub struct ServerDirectory {
    source: Option<PathBuf>,
    global: ServerEntry,
    servers: HashMap<String, ServerEntry>,
}

impl ServerDirectory {
    /// An empty directory; every alias resolves as a host name.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse directory text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut directory = Self::default();
        let mut section: Option<String> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_ascii_lowercase();
                directory.servers.entry(name.clone()).or_default();
                section = Some(name);
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!(line = lineno + 1, "ignoring malformed server directory line");
                continue;
            };
            let Some(ref name) = section else {
                continue;
            };

            let key = normalize_key(key);
            let value = value.trim();
            let Some(entry) = directory.servers.get_mut(name) else {
                continue;
            };

            match key.as_str() {
                "host" => entry.host = Some(value.to_string()),
                "port" => match value.parse() {
                    Ok(port) => entry.port = Some(port),
                    Err(_) => warn_invalid(name, &key, value),
                },
                "tdsversion" => entry.tds_version = Some(value.to_string()),
                "textsize" => match value.parse() {
                    Ok(size) => entry.text_size = Some(size),
                    Err(_) => warn_invalid(name, &key, value),
                },
                "clientcharset" => entry.client_charset = Some(value.to_string()),
                _ => {}
            }
        }

        if let Some(global) = directory.servers.remove(GLOBAL_SECTION) {
            directory.global = global;
        }
        directory
    }

    /// Read and parse a directory file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read server directory {}: {e}", path.display()))
        })?;
        let mut directory = Self::parse(&text);
        directory.source = Some(path.to_path_buf());
        tracing::debug!(
            path = %path.display(),
            aliases = directory.servers.len(),
            "loaded server directory"
        );
        Ok(directory)
    }

    /// Load the first file found in the standard locations.
    ///
    /// The locations are, in order: `$FREETDSCONF`, `~/.freetds.conf`,
    /// `/etc/freetds/freetds.conf` and `/etc/freetds.conf`. If none exists
    /// the directory is empty.
    pub fn load_default() -> Result<Self> {
        for path in default_paths() {
            if path.is_file() {
                return Self::load(path);
            }
        }
        tracing::debug!("no server directory found");
        Ok(Self::empty())
    }

    /// File this directory was read from.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Defaults from the `[global]` section.
    #[must_use]
    pub fn global(&self) -> &ServerEntry {
        &self.global
    }

    /// Settings for `alias`, merged with the global defaults.
    ///
    /// Returns `None` when the alias has no section.
    #[must_use]
    pub fn lookup(&self, alias: &str) -> Option<ServerEntry> {
        self.servers
            .get(&alias.to_ascii_lowercase())
            .map(|entry| entry.clone().or(&self.global))
    }

    /// Number of aliases, not counting `[global]`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether the directory defines no aliases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Candidate directory files in lookup order.
#[must_use]
pub fn default_paths() -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(4);
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        paths.push(PathBuf::from(path));
    }
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".freetds.conf"));
    }
    paths.push(PathBuf::from("/etc/freetds/freetds.conf"));
    paths.push(PathBuf::from("/etc/freetds.conf"));
    paths
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn warn_invalid(section: &str, key: &str, value: &str) {
    tracing::warn!(section, key, value, "ignoring invalid server directory value");
}
