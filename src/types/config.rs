use std::time::Duration;

/// Configuration for a controller session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for the TCP connect (default: 10 seconds)
    pub connection_timeout: Duration,

    /// Timeout for one pairing round trip (default: 10 seconds)
    pub handshake_timeout: Duration,

    /// Timeout for the ping read (default: 5 seconds)
    pub ping_timeout: Duration,

    /// Buffered session events per subscriber before the slowest one lags (default: 256)
    pub event_capacity: usize,

    /// Largest HTTP message accepted from the accessory (default: 1 MiB)
    pub max_message_size: usize,

    /// Value of the `User-Agent` header
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(5),
            event_capacity: 256,
            max_message_size: 1024 * 1024,
            user_agent: format!("homekit-controller/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SessionConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for `SessionConfig`
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set connection timeout
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the per-message pairing timeout
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set ping timeout
    #[must_use]
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.ping_timeout = timeout;
        self
    }

    /// Set the event channel capacity (at least 1)
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    /// Set the largest accepted message
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the `User-Agent` header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
