//! Policy engine errors

use sdn_core::Dpid;
use sdn_network::NetworkError;
use thiserror::Error;

use crate::roles::Role;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Switch {0} has no configured role")]
    UnknownSwitch(Dpid),

    #[error("Switch {dpid} is listed more than once in the role map ({first}, then {second})")]
    DuplicateSwitch {
        dpid: Dpid,
        first: Role,
        second: Role,
    },

    #[error("No open session for switch {0}")]
    NoSession(Dpid),

    #[error("Host '{0}' not found in address directory")]
    UnknownHost(String),

    #[error("Invalid address directory: {0}")]
    InvalidDirectory(String),

    #[error("Failed to install rule on switch {dpid} ({rule}): {source}")]
    RuleInstall {
        dpid: Dpid,
        rule: String,
        #[source]
        source: NetworkError,
    },

    /// A block rule did not reach the switch; the segment is unprotected
    #[error("Failed to install firewall rule on switch {dpid} ({rule}): {source}")]
    FirewallRule {
        dpid: Dpid,
        rule: String,
        #[source]
        source: NetworkError,
    },

    #[error("Failed to send packet-out to switch {dpid}: {source}")]
    PacketOut {
        dpid: Dpid,
        #[source]
        source: NetworkError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] sdn_core::Error),
}

impl PolicyError {
    /// Returns true if a firewall guarantee no longer holds on the switch
    pub fn is_security_degraded(&self) -> bool {
        matches!(self, PolicyError::FirewallRule { .. })
    }

    /// Returns true if the switch or host table is misconfigured
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PolicyError::UnknownSwitch(_)
                | PolicyError::DuplicateSwitch { .. }
                | PolicyError::UnknownHost(_)
                | PolicyError::InvalidDirectory(_)
                | PolicyError::Config(_)
        )
    }

    /// Switch the error concerns, if any
    pub fn dpid(&self) -> Option<Dpid> {
        match self {
            PolicyError::UnknownSwitch(dpid)
            | PolicyError::DuplicateSwitch { dpid, .. }
            | PolicyError::NoSession(dpid)
            | PolicyError::RuleInstall { dpid, .. }
            | PolicyError::FirewallRule { dpid, .. }
            | PolicyError::PacketOut { dpid, .. } => Some(*dpid),
            _ => None,
        }
    }
}
