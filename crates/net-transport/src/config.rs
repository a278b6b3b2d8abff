//! Channel configuration

use std::time::Duration;

use shared_protocol::{DEFAULT_MAX_FRAME_SIZE, MAX_FRAME_SIZE_LIMIT};

use crate::{TransportError, TransportResult};

/// Default bound on the public key exchange
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Secure channel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Maximum plaintext bytes per frame (both peers should agree)
    pub max_frame_size: usize,
    /// How long the public key exchange may take
    pub handshake_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    /// Check the limits before any connection is made
    pub fn validate(&self) -> TransportResult<()> {
        if self.max_frame_size == 0 || self.max_frame_size > MAX_FRAME_SIZE_LIMIT {
            return Err(TransportError::InvalidConfig(format!(
                "max_frame_size must be between 1 and {MAX_FRAME_SIZE_LIMIT}, got {}",
                self.max_frame_size
            )));
        }

        if self.handshake_timeout.is_zero() {
            return Err(TransportError::InvalidConfig(
                "handshake_timeout must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
