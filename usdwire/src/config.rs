use std::time::Duration;

use crate::{
    DEFAULT_LINGER_MS, DEFAULT_MAX_CONTENT_SIZE, DEFAULT_RECV_TIMEOUT_MS, DEFAULT_SEND_TIMEOUT_MS,
};

/// Socket options applied when a [`Session`](crate::Session) connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long queued outbound data may hold up `disconnect`.
    pub linger: Duration,
    /// Upper bound on a single reply wait (also bounds the handshake).
    pub recv_timeout: Duration,
    /// Upper bound on writing one envelope (also bounds the TCP connect).
    pub send_timeout: Duration,
    /// Largest file content accepted by `send_file`.
    pub max_content_size: u64,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            linger: Duration::from_millis(DEFAULT_LINGER_MS),
            recv_timeout: Duration::from_millis(DEFAULT_RECV_TIMEOUT_MS),
            send_timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
        }
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_max_content_size(mut self, size: u64) -> Self {
        self.max_content_size = size;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.linger, Duration::from_millis(1000));
        assert_eq!(config.recv_timeout, Duration::from_millis(5000));
        assert_eq!(config.send_timeout, Duration::from_millis(5000));
        assert_eq!(config.max_content_size, 256 * 1024 * 1024);
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new()
            .with_recv_timeout(Duration::from_millis(200))
            .with_max_content_size(16);
        assert_eq!(config.recv_timeout, Duration::from_millis(200));
        assert_eq!(config.max_content_size, 16);
        assert_eq!(config.linger, Duration::from_millis(1000));
    }
}
