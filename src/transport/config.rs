use std::time::Duration;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connection timeout
    pub connect_timeout: Duration,

    /// Timeout for a single socket write
    pub write_timeout: Duration,

    /// Disable Nagle's algorithm
    pub nodelay: bool,

    /// Chunks buffered between the streams and the socket writer
    pub send_queue_capacity: usize,

    /// Port used when the URL has none
    pub default_port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
            nodelay: true,
            send_queue_capacity: 1024,
            default_port: 1935,
        }
    }
}

impl ConnectionConfig {
    /// Create config builder
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.send_queue_capacity == 0 {
            return Err(Error::config("Send queue capacity must be at least 1"));
        }

        if self.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must not be zero"));
        }

        if self.write_timeout.is_zero() {
            return Err(Error::config("Write timeout must not be zero"));
        }

        Ok(())
    }
}

/// Builder for ConnectionConfig
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Create new builder
    pub fn new() -> Self {
        ConnectionConfigBuilder {
            config: ConnectionConfig::default(),
        }
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Set send queue capacity
    pub fn send_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.send_queue_capacity = capacity;
        self
    }

    /// Set port used when the URL has none
    pub fn default_port(mut self, port: u16) -> Self {
        self.config.default_port = port;
        self
    }

    /// Build configuration
    pub fn build(self) -> Result<ConnectionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
