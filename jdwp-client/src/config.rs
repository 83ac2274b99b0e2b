// Connection tuning knobs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum allowed JDWP packet size (10MB)
/// This prevents memory exhaustion from malicious or buggy JVMs
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JdwpConfig {
    /// SO_SNDBUF for the debugger socket
    pub send_buffer_size: u32,
    /// SO_RCVBUF for the debugger socket
    pub recv_buffer_size: u32,
    /// SO_LINGER; lets queued bytes (e.g. a final Dispose) flush on close.
    ///
    /// The socket is closed when the last engine clone is dropped, and with a
    /// linger set that close blocks the dropping runtime thread until unsent
    /// data drains or the timeout expires. `None` gives a non-blocking close.
    pub linger: Option<Duration>,
    /// Upper bound on TCP connect. The handshake itself is not bounded.
    pub connect_timeout: Option<Duration>,
    /// Frames declaring a larger total length are treated as corrupt
    pub max_frame_size: usize,
    /// Budget for the best-effort Dispose sent when a session closes
    pub teardown_timeout: Duration,
}

impl Default for JdwpConfig {
    fn default() -> Self {
        Self {
            send_buffer_size: 2048,
            recv_buffer_size: 2048,
            linger: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            teardown_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_round_trip() {
        let config = JdwpConfig {
            linger: None,
            ..JdwpConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: JdwpConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
