//! Entry point that owns the server directory.

use once_cell::sync::OnceCell;

use crate::config::Config;
use crate::connection::Connection;
use crate::directory::ServerDirectory;
use crate::error::Result;

/// Opens connections.
///
/// The default server directory is only read the first time a
/// configuration needs to resolve a `servername`.
#[derive(Debug, Default)]
pub struct Driver {
    directory: OnceCell<ServerDirectory>,
}

impl Driver {
    /// Create a driver that loads the standard directory on demand.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver with an explicit directory.
    #[must_use]
    pub fn with_directory(directory: ServerDirectory) -> Self {
        Self {
            directory: OnceCell::with_value(directory),
        }
    }

    /// The server directory, loading it if needed.
    pub fn directory(&self) -> Result<&ServerDirectory> {
        self.directory.get_or_try_init(ServerDirectory::load_default)
    }

    /// Validate `config`, then connect and log in.
    ///
    /// Configuration problems are reported before any socket is opened.
    pub async fn connect(&self, config: &Config) -> Result<Connection> {
        config.validate()?;
        let directory = if config.servername.is_some() {
            Some(self.directory()?)
        } else {
            self.directory.get()
        };
        Connection::connect(config, directory).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn test_missing_address_is_config_error() {
        let driver = Driver::with_directory(ServerDirectory::empty());
        let err = driver
            .connect(&Config::new().username("sa"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_port_without_hostname_is_config_error() {
        let driver = Driver::with_directory(ServerDirectory::empty());
        let config = Config::new().servername("alias").port(1433).username("sa");
        let err = driver.connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_injected_directory_is_used() {
        let dir = ServerDirectory::parse("[a]\nhost = h\n");
        let driver = Driver::with_directory(dir);
        assert!(driver.directory().unwrap().lookup("a").is_some());
    }
}
