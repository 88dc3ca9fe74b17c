//! Switch-facing error types
//!
//! Covers transport send failures and frame codec failures, with
//! hints for diagnosing them from the logs.

use sdn_core::Dpid;
use thiserror::Error;

/// Errors raised talking to a switch or decoding what it sent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    #[error("Connection to switch {0} is closed")]
    ConnectionClosed(Dpid),

    #[error("Failed to send to switch {dpid}: {reason}")]
    Send { dpid: Dpid, reason: String },

    // ========================================================================
    // Codec Errors
    // ========================================================================
    #[error("Truncated {what}: need {needed} bytes, got {got}")]
    Truncated {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("{what} too large to encode: {got} bytes, limit {max}")]
    TooLarge {
        what: &'static str,
        max: usize,
        got: usize,
    },
}

impl NetworkError {
    /// Create a send error
    pub fn send(dpid: Dpid, reason: impl Into<String>) -> Self {
        NetworkError::Send {
            dpid,
            reason: reason.into(),
        }
    }

    /// Create a malformed frame error
    pub fn malformed(msg: impl Into<String>) -> Self {
        NetworkError::Malformed(msg.into())
    }

    /// Get a helpful suggestion for resolving this error
    pub fn suggestion(&self) -> &'static str {
        match self {
            NetworkError::ConnectionClosed(_) => {
                "The switch disconnected; rules are reinstalled when it reconnects"
            }
            NetworkError::Send { .. } => "Check the control channel between switch and controller",
            NetworkError::Truncated { .. } => "The switch may be truncating packet-in data (miss_send_len)",
            NetworkError::Malformed(_) => "Inspect the frame with a packet capture",
            NetworkError::TooLarge { .. } => "Split the payload; IPv4 total length is 16 bits",
        }
    }

    /// Returns true if a later attempt could succeed (nothing here retries)
    pub fn is_transient(&self) -> bool {
        matches!(self, NetworkError::Send { .. })
    }

    /// Returns true if this came from decoding a frame rather than sending
    pub fn is_codec(&self) -> bool {
        matches!(
            self,
            NetworkError::Truncated { .. }
                | NetworkError::Malformed(_)
                | NetworkError::TooLarge { .. }
        )
    }
}
