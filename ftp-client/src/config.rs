//! ## CLIENT CONFIGURATION
//!
//! Explicit, enumerated tunables: every timeout and default used by the
//! control channel, data channel, and transfer engine lives here rather
//! than as a scattered literal.

use std::time::Duration;

/// The chunk size used by the transfer engine's download/upload/append
/// loops. Fixed, not configurable.
pub const TRANSFER_CHUNK_SIZE: usize = 8192;

/// ## CLIENT CONFIG
///
/// Timeouts and defaults for a [crate::session::Session]. Construct with
/// [ClientConfig::default] and override individual fields, or use the
/// `with_*` builder methods.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for establishing the control-channel TCP connection.
    pub connect_timeout: Duration,

    /// Read/write timeout applied to the control channel once connected.
    pub control_timeout: Duration,

    /// Timeout for dialing (passive mode) or accepting (active mode) the
    /// data channel.
    pub data_connect_timeout: Duration,

    /// How long [crate::session::Session::close] waits per in-flight
    /// transfer worker for an orderly shutdown before treating it as
    /// detached.
    pub shutdown_grace: Duration,

    /// Default username used by [crate::session::Session::login].
    pub default_user: String,

    /// Default password used by [crate::session::Session::login].
    pub default_pass: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            control_timeout: Duration::from_secs(30),
            data_connect_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            default_user: "anonymous".to_string(),
            default_pass: "anonymous@".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    pub fn with_data_connect_timeout(mut self, timeout: Duration) -> Self {
        self.data_connect_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}
