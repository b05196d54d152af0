//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`ClientConfig`] values
//! without repeating boilerplate across crate boundaries.

use keel_config::ClientConfig;

/// Fluent builder for [`ClientConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .host("unix:///tmp/engine.sock")
///     .retry_delay_ms(50)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: ClientConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.engine.host = Some(host.to_string());
        self
    }

    pub fn tls_verify(mut self, enabled: bool) -> Self {
        self.config.engine.tls_verify = Some(enabled);
        self
    }

    pub fn cert_path(mut self, path: &str) -> Self {
        self.config.engine.cert_path = Some(path.to_string());
        self
    }

    pub fn retry_delay_ms(mut self, delay: u64) -> Self {
        self.config.events.retry_delay_ms = delay;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.events.channel_capacity = capacity;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
