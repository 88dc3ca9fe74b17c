//! Rule installer
//!
//! Pushes flow rules to a switch. Sends are fire-and-forget: nothing here
//! waits for the switch to activate a rule, and a failed send is returned
//! to the caller rather than retried. Re-sending an identical rule replaces
//! it on the switch (same match and priority), so installs are idempotent.

use sdn_network::packet::{ETH_TYPE_ARP, ETH_TYPE_IPV4, IP_PROTO_ICMP};
use sdn_network::{FlowAction, FlowMatch, FlowRule, SwitchConnection};
use tracing::{debug, warn};

use crate::error::PolicyError;

// ============================================================================
// Priorities (higher wins)
// ============================================================================

/// Catch-all flood on edge and datacenter switches
pub const PRIORITY_DEFAULT_FLOOD: u16 = 1;

/// ARP flood in the ICMP/ARP-only profile
pub const PRIORITY_ARP_FLOOD: u16 = 9;

/// ICMP flood in the ICMP/ARP-only profile
pub const PRIORITY_ICMP_FLOOD: u16 = 10;

/// Routes learned by the ARP proxy
pub const PRIORITY_PROXY_ROUTE: u16 = 500;

/// Firewall: ICMP from the untrusted host
pub const PRIORITY_BLOCK_ICMP: u16 = 1000;

/// Firewall: all IPv4 from the untrusted host to the protected server
pub const PRIORITY_BLOCK_IP: u16 = 1100;

/// Lowest-priority catch-all flooding every port except ingress
pub fn default_flood_rule() -> FlowRule {
    FlowRule::new(
        PRIORITY_DEFAULT_FLOOD,
        FlowMatch::any(),
        vec![FlowAction::Flood],
    )
}

/// Flood ICMP and ARP, leave everything else to the controller
pub fn icmp_arp_flood_rules() -> Vec<FlowRule> {
    vec![
        FlowRule::new(
            PRIORITY_ICMP_FLOOD,
            FlowMatch::any()
                .with_dl_type(ETH_TYPE_IPV4)
                .with_nw_proto(IP_PROTO_ICMP),
            vec![FlowAction::Flood],
        ),
        FlowRule::new(
            PRIORITY_ARP_FLOOD,
            FlowMatch::any().with_dl_type(ETH_TYPE_ARP),
            vec![FlowAction::Flood],
        ),
    ]
}

pub fn install_default_flood(conn: &dyn SwitchConnection) -> Result<(), PolicyError> {
    install_rule(conn, default_flood_rule())
}

/// Push one rule as-is
pub fn install_rule(conn: &dyn SwitchConnection, rule: FlowRule) -> Result<(), PolicyError> {
    let dpid = conn.dpid();
    let description = rule.to_string();
    debug!(dpid, "Installing flow: {}", description);

    conn.send_flow_mod(rule).map_err(|source| {
        warn!(dpid, "Flow install failed: {} ({})", description, source.suggestion());
        PolicyError::RuleInstall {
            dpid,
            rule: description,
            source,
        }
    })
}

/// Push every rule, continuing past failures.
///
/// Returns the number installed, or the first failure once all were attempted.
pub fn install_all(
    conn: &dyn SwitchConnection,
    rules: impl IntoIterator<Item = FlowRule>,
) -> Result<usize, PolicyError> {
    let mut installed = 0;
    let mut first_error = None;

    for rule in rules {
        match install_rule(conn, rule) {
            Ok(()) => installed += 1,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(installed),
    }
}
