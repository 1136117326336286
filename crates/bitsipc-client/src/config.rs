use std::time::Duration;

use bitsipc_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

use crate::error::{ClientError, Result};

/// Runtime behavior configuration for a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Receive timeout on the socket. Bounds how long `stop` waits for the
    /// dispatch loop and how long a manual dispatch call blocks when idle.
    pub read_timeout: Duration,
    /// Send timeout on the socket. `None` blocks until the peer drains.
    pub write_timeout: Option<Duration>,
    /// Default deadline for [`crate::Client::send_request`]. `None` waits
    /// until the response arrives or the connection ends.
    pub request_timeout: Option<Duration>,
    /// Largest message accepted in either direction.
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
            write_timeout: Some(Duration::from_secs(5)),
            request_timeout: Some(Duration::from_secs(30)),
            max_message_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ClientConfig {
    /// Reject settings the socket layer cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "read_timeout must be greater than zero".to_string(),
            ));
        }
        if self.write_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ClientError::InvalidConfig(
                "write_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ClientError::InvalidConfig(
                "max_message_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_message_size,
            read_timeout: Some(self.read_timeout),
            write_timeout: self.write_timeout,
        }
    }
}
