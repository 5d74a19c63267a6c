//! Controller configuration.

use serde::{Deserialize, Serialize};

/// Default URL prefix the forwarding endpoints are mounted under.
pub const DEFAULT_ENDPOINT_PREFIX: &str = "/api/mock";

/// Default timeout for one peer forwarding call, in seconds.
pub const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 30;

/// Static configuration of one controller instance.
///
/// Supplied externally (env or file); the dispatcher never parses or
/// persists configuration itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Host IP this instance runs on. Broadcast skips peers with this host
    /// so a controller never forwards to itself.
    pub self_host: String,
    /// Bind address for the HTTP surface.
    pub listen_host: String,
    pub listen_port: u16,
    /// URL prefix peers mount the forwarding endpoints under.
    pub endpoint_prefix: String,
    /// Timeout for one peer forwarding call. The dispatcher defines no
    /// cancellation of its own; this threaded-through timeout is the only
    /// protection against a hung peer.
    pub forward_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            self_host: "127.0.0.1".to_string(),
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8085,
            endpoint_prefix: DEFAULT_ENDPOINT_PREFIX.to_string(),
            forward_timeout_secs: DEFAULT_FORWARD_TIMEOUT_SECS,
        }
    }
}

impl ControllerConfig {
    pub fn with_self_host(host: &str) -> Self {
        Self {
            self_host: host.to_string(),
            ..Default::default()
        }
    }
}
