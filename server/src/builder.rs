use crate::{Server, ServerConfig, ServerError};
use discuss_protocol::{MAX_CAPACITY, MIN_CAPACITY};

/// Builder for constructing a Server instance.
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set server configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the HTTP/WebSocket address.
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_addr = addr.into();
        self
    }

    /// Capacity used when a create request omits it. Default: 8.
    pub fn default_capacity(mut self, capacity: u32) -> Self {
        self.config.default_capacity = capacity;
        self
    }

    /// Largest room capacity accepted. Default and ceiling: 10.
    pub fn max_capacity(mut self, capacity: u32) -> Self {
        self.config.max_capacity = capacity;
        self
    }

    /// Per-connection outbound queue length. Default: 256.
    pub fn outbound_buffer(mut self, len: usize) -> Self {
        self.config.outbound_buffer = len;
        self
    }

    /// WebSocket ping interval and idle timeout, in seconds.
    pub fn heartbeat(mut self, interval_secs: u64, timeout_secs: u64) -> Self {
        self.config.heartbeat_interval_secs = interval_secs;
        self.config.client_timeout_secs = timeout_secs;
        self
    }

    /// Remove never-joined rooms after this many seconds. Default: 300.
    pub fn unclaimed_room_timeout_secs(mut self, secs: u64) -> Self {
        self.config.unclaimed_room_timeout_secs = secs;
        self
    }

    /// Set allowed CORS origins. If not set, any origin is allowed.
    ///
    /// # Example
    /// ```ignore
    /// .cors_origins(["https://discuss.example.com"])
    /// ```
    pub fn cors_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cors_origins = origins.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Build the server.
    pub fn build(self) -> Result<Server, ServerError> {
        let config = self.config;
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&config.max_capacity) {
            return Err(ServerError::Config(format!(
                "max_capacity must be within {MIN_CAPACITY}..={MAX_CAPACITY}"
            )));
        }
        if !(MIN_CAPACITY..=config.max_capacity).contains(&config.default_capacity) {
            return Err(ServerError::Config(format!(
                "default_capacity must be within {MIN_CAPACITY}..={}",
                config.max_capacity
            )));
        }
        if config.outbound_buffer == 0 {
            return Err(ServerError::Config("outbound_buffer must be positive".into()));
        }
        if config.heartbeat_interval_secs == 0
            || config.client_timeout_secs <= config.heartbeat_interval_secs
        {
            return Err(ServerError::Config(
                "client timeout must exceed a non-zero heartbeat interval".into(),
            ));
        }
        Ok(Server { config })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let server = ServerBuilder::new().build().unwrap();
        assert_eq!(server.config().http_addr, "0.0.0.0:5000");
        assert_eq!(server.config().max_capacity, MAX_CAPACITY);
    }

    #[test]
    fn rejects_capacity_outside_range() {
        assert!(ServerBuilder::new().max_capacity(11).build().is_err());
        assert!(ServerBuilder::new().max_capacity(1).build().is_err());
        assert!(ServerBuilder::new()
            .max_capacity(4)
            .default_capacity(6)
            .build()
            .is_err());
    }

    #[test]
    fn rejects_bad_heartbeat() {
        assert!(ServerBuilder::new().heartbeat(0, 30).build().is_err());
        assert!(ServerBuilder::new().heartbeat(10, 10).build().is_err());
        assert!(ServerBuilder::new().outbound_buffer(0).build().is_err());
    }

    #[test]
    fn setters_apply() {
        let server = ServerBuilder::new()
            .http_addr("127.0.0.1:9000")
            .max_capacity(6)
            .default_capacity(4)
            .cors_origins(["https://a.example"])
            .build()
            .unwrap();
        let config = server.config();
        assert_eq!(config.http_addr, "127.0.0.1:9000");
        assert_eq!(config.default_capacity, 4);
        assert_eq!(config.cors_origins, vec!["https://a.example".to_string()]);
    }
}
