//! Segmented firewall for the core switch
//!
//! Two block rules keep the untrusted host away from the rest of the
//! network: no ICMP from it anywhere, and no IPv4 at all from it to the
//! protected server. Both outrank every forwarding rule the controller
//! installs, including routes learned by the ARP proxy.

use sdn_network::packet::{ETH_TYPE_IPV4, IP_PROTO_ICMP};
use sdn_network::{FlowMatch, FlowRule, SwitchConnection};
use std::net::Ipv4Addr;
use tracing::{error, info};

use crate::directory::AddressDirectory;
use crate::error::PolicyError;
use crate::installer::{self, PRIORITY_BLOCK_ICMP, PRIORITY_BLOCK_IP};
use crate::settings::FirewallSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallPolicy {
    untrusted: Ipv4Addr,
    protected: Ipv4Addr,
}

impl FirewallPolicy {
    pub fn new(untrusted: Ipv4Addr, protected: Ipv4Addr) -> Self {
        Self {
            untrusted,
            protected,
        }
    }

    /// Resolve the designated host names through the directory
    pub fn from_directory(
        directory: &AddressDirectory,
        settings: &FirewallSettings,
    ) -> Result<Self, PolicyError> {
        Ok(Self::new(
            directory.lookup_address(&settings.untrusted_host)?,
            directory.lookup_address(&settings.protected_host)?,
        ))
    }

    pub fn untrusted(&self) -> Ipv4Addr {
        self.untrusted
    }

    pub fn protected(&self) -> Ipv4Addr {
        self.protected
    }

    pub fn block_icmp_rule(&self) -> FlowRule {
        FlowRule::drop(
            PRIORITY_BLOCK_ICMP,
            FlowMatch::any()
                .with_dl_type(ETH_TYPE_IPV4)
                .with_nw_proto(IP_PROTO_ICMP)
                .with_nw_src(self.untrusted),
        )
    }

    pub fn block_ip_rule(&self) -> FlowRule {
        FlowRule::drop(
            PRIORITY_BLOCK_IP,
            FlowMatch::any()
                .with_dl_type(ETH_TYPE_IPV4)
                .with_nw_src(self.untrusted)
                .with_nw_dst(self.protected),
        )
    }

    pub fn rules(&self) -> Vec<FlowRule> {
        vec![self.block_icmp_rule(), self.block_ip_rule()]
    }

    /// Install both block rules, attempting each even if one fails.
    ///
    /// A failure leaves the segment open, so it is logged at error level
    /// and returned as `PolicyError::FirewallRule`.
    pub fn install(&self, conn: &dyn SwitchConnection) -> Result<usize, PolicyError> {
        let dpid = conn.dpid();
        let mut installed = 0;
        let mut first_error = None;

        for rule in self.rules() {
            match installer::install_rule(conn, rule) {
                Ok(()) => installed += 1,
                Err(PolicyError::RuleInstall { rule, source, .. }) => {
                    error!(
                        dpid,
                        untrusted = %self.untrusted,
                        "Firewall rule NOT installed, traffic from untrusted host is not blocked: {}: {}",
                        rule,
                        source
                    );
                    first_error.get_or_insert(PolicyError::FirewallRule { dpid, rule, source });
                }
                Err(other) => {
                    first_error.get_or_insert(other);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            dpid,
            "Firewall active: {} isolated from {}, ICMP from {} dropped",
            self.untrusted,
            self.protected,
            self.untrusted
        );
        Ok(installed)
    }
}
