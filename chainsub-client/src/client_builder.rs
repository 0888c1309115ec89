//! Client builder and connection settings
//!
//! The `ClientBuilder` provides a fluent API for configuring a connection
//! before dialing. It allows you to:
//! - Tune the slow-consumer threshold (per-subscription channel capacity)
//! - Tune keepalive, write and handshake deadlines
//! - Choose how request ids are generated
//! - Add HTTP headers to the upgrade request (API keys, auth tokens)
//! - Enable observability (OpenTelemetry)
//!
//! # Examples
//!
//! ```rust,no_run
//! use chainsub_client::{ClientBuilder, IdStrategy};
//! use std::time::Duration;
//!
//! # async fn example() -> chainsub_core::Result<()> {
//! let client = ClientBuilder::new("wss://api.mainnet-beta.solana.com")
//!     .with_channel_capacity(4096)
//!     .with_ping_interval(Duration::from_secs(15))
//!     .with_id_strategy(IdStrategy::Random31)
//!     .with_header("x-api-key", "secret")
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::client::ChainsubClient;
use crate::request::IdStrategy;
use crate::transport;
use chainsub_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;
use std::time::Duration;

/// Connection settings
///
/// # Defaults
///
/// | setting | default |
/// |---------|---------|
/// | `channel_capacity` | 1024 |
/// | `ping_interval` | 20s |
/// | `pong_timeout` | 30s |
/// | `write_timeout` | 10s |
/// | `handshake_timeout` | 45s |
/// | `id_strategy` | [`IdStrategy::Sequential`] |
/// | `keepalive` | on |
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Values buffered per subscription before it is closed as a slow consumer
    pub channel_capacity: usize,
    /// Period between keepalive pings
    pub ping_interval: Duration,
    /// How long the reader waits for a pong before failing the connection
    pub pong_timeout: Duration,
    /// Deadline for every outbound frame
    pub write_timeout: Duration,
    /// Deadline for the WebSocket handshake
    pub handshake_timeout: Duration,
    /// How request ids are chosen
    pub id_strategy: IdStrategy,
    /// Extra headers sent with the upgrade request
    pub headers: Vec<(String, String)>,
    /// Whether to run the keepalive loop and enforce the read deadline
    pub keepalive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(45),
            id_strategy: IdStrategy::Sequential,
            headers: Vec::new(),
            keepalive: true,
        }
    }
}

impl ClientConfig {
    /// Check that the settings are usable together
    ///
    /// # Errors
    ///
    /// `Error::InvalidConfig` for a zero capacity or timeout, or a ping
    /// interval that is not shorter than the pong timeout.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }

        for (name, value) in [
            ("write_timeout", self.write_timeout),
            ("handshake_timeout", self.handshake_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }

        if self.keepalive {
            if self.ping_interval.is_zero() {
                return Err(Error::InvalidConfig(
                    "ping_interval must be non-zero".to_string(),
                ));
            }
            if self.ping_interval >= self.pong_timeout {
                return Err(Error::InvalidConfig(format!(
                    "ping_interval ({:?}) must be shorter than pong_timeout ({:?})",
                    self.ping_interval, self.pong_timeout
                )));
            }
        }

        Ok(())
    }
}

/// Builder for configuring and creating a ChainsubClient
pub struct ClientBuilder {
    url: String,
    config: ClientConfig,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: ClientConfig::default(),
            observability_config: None,
            service_name: None,
        }
    }

    /// Replace all connection settings at once
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-subscription channel capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the keepalive ping period
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Set the read deadline window
    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.config.pong_timeout = timeout;
        self
    }

    /// Set the write deadline
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the handshake deadline
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Choose how request ids are generated
    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.config.id_strategy = strategy;
        self
    }

    /// Use random 31-bit request ids
    pub fn with_short_ids(self) -> Self {
        self.with_id_strategy(IdStrategy::Random31)
    }

    /// Add a header to the upgrade request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    /// Disable pings and the read deadline
    pub fn without_keepalive(mut self) -> Self {
        self.config.keepalive = false;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Settings the client will be built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Validate the settings, dial and start the background tasks
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig` for unusable settings or headers
    /// - `Error::Dial` if the handshake fails or times out
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    pub async fn connect(self) -> Result<ChainsubClient> {
        self.config.validate()?;

        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            chainsub_core::init_observability(config.clone()).map_err(|e| {
                Error::InvalidConfig(format!("Failed to initialize observability: {}", e))
            })?;

            Some(Arc::new(crate::ClientMetrics::new(config.service_name)))
        } else {
            None
        };

        tracing::info!("Connecting to server");
        let (sink, stream) = transport::dial(
            &self.url,
            &self.config.headers,
            self.config.handshake_timeout,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Dial failed");
            e
        })?;
        tracing::info!("Connected successfully");

        Ok(ChainsubClient::start(
            self.url,
            &self.config,
            sink,
            stream,
            metrics,
        ))
    }

    /// Start a client over an already-connected transport
    #[cfg(test)]
    pub(crate) fn connect_transport(
        self,
        sink: transport::FrameSink,
        stream: transport::FrameStream,
    ) -> Result<ChainsubClient> {
        self.config.validate()?;
        Ok(ChainsubClient::start(
            self.url,
            &self.config,
            sink,
            stream,
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new("ws://localhost:8900");
        let config = builder.config();

        assert_eq!(builder.url, "ws://localhost:8900");
        assert_eq!(config.channel_capacity, 1024);
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.pong_timeout, Duration::from_secs(30));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.handshake_timeout, Duration::from_secs(45));
        assert_eq!(config.id_strategy, IdStrategy::Sequential);
        assert!(config.keepalive);
        assert!(builder.observability_config.is_none());
        assert!(builder.service_name.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let builder = ClientBuilder::new("ws://localhost:8900")
            .with_channel_capacity(8)
            .with_ping_interval(Duration::from_secs(5))
            .with_pong_timeout(Duration::from_secs(7))
            .with_write_timeout(Duration::from_secs(1))
            .with_handshake_timeout(Duration::from_secs(3))
            .with_short_ids()
            .with_header("x-api-key", "secret")
            .service_name("slot-watcher")
            .with_default_observability();

        let config = builder.config();
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.pong_timeout, Duration::from_secs(7));
        assert_eq!(config.write_timeout, Duration::from_secs(1));
        assert_eq!(config.handshake_timeout, Duration::from_secs(3));
        assert_eq!(config.id_strategy, IdStrategy::Random31);
        assert_eq!(
            config.headers,
            vec![("x-api-key".to_string(), "secret".to_string())]
        );
        assert!(config.validate().is_ok());
        assert_eq!(builder.service_name.as_deref(), Some("slot-watcher"));
        assert_eq!(
            builder.observability_config.map(|c| c.service_name),
            Some("chainsub".to_string())
        );
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = ClientConfig {
            channel_capacity: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_requires_ping_shorter_than_pong_timeout() {
        let config = ClientConfig {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(30),
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = ClientConfig {
            keepalive: false,
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_write_timeout() {
        let config = ClientConfig {
            write_timeout: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_connect_fails_fast_on_invalid_config() {
        let err = ClientBuilder::new("ws://127.0.0.1:1")
            .with_channel_capacity(0)
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_header() {
        let err = ClientBuilder::new("ws://127.0.0.1:1")
            .with_header("bad header", "x")
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
