//! Configures the internals of a `Handshaker` (SPEC_FULL §2: a
//! connect timeout and a separate, shorter handshake-completion timeout,
//! distinct from the steady-state peer timeout enforced once the
//! connection graduates to the peer wire protocol).

use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_MILLIS: u64 = 1_000;
const DEFAULT_HANDSHAKE_TIMEOUT_MILLIS: u64 = 2_000;

/// Configures timeouts for connection establishment and handshaking.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct HandshakerConfig {
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl HandshakerConfig {
    /// Sets the timeout for the underlying transport connect.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> HandshakerConfig {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the timeout for completing the 68-byte handshake exchange,
    /// once the transport is connected.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> HandshakerConfig {
        self.handshake_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}

impl Default for HandshakerConfig {
    fn default() -> HandshakerConfig {
        HandshakerConfig {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MILLIS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MILLIS),
        }
    }
}
