//! Controller settings
//!
//! The topology the policy engine enforces: host table, switch roles,
//! firewall designations and ARP proxy addresses. Defaults describe the
//! reference lab topology, so a controller started without a settings
//! file behaves like the stock deployment.
//!
//! ```toml
//! profile = "segmented"
//!
//! [[hosts]]
//! name = "h10"
//! address = "10.0.1.10"
//! subnet = "10.0.1.0/24"
//!
//! [[switches]]
//! dpid = 21
//! role = "core"
//!
//! [firewall]
//! untrusted_host = "hnotrust"
//! protected_host = "serv1"
//!
//! [arp]
//! proxy_mac = "01:02:03:04:05:06"
//! require_known_target = false
//! ```

use ipnet::Ipv4Net;
use sdn_core::{Dpid, MacAddr};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::PolicyError;
use crate::roles::Role;

/// Environment prefix for overrides (`SDN_PROFILE`, `SDN_ARP__PROXY_MAC`, ...)
pub const ENV_PREFIX: &str = "SDN";

/// Which rule set connecting switches receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyProfile {
    /// Per-role baseline rules, core firewall and ARP proxy
    #[default]
    Segmented,
    /// Every switch floods ICMP and ARP; everything else reaches the controller and is dropped
    IcmpArpOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub name: String,
    pub address: Ipv4Addr,
    pub subnet: Ipv4Net,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchEntry {
    pub dpid: Dpid,
    pub role: Role,
    /// Overrides `arp.proxy_mac` for this switch
    #[serde(default)]
    pub proxy_mac: Option<MacAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallSettings {
    pub untrusted_host: String,
    pub protected_host: String,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            untrusted_host: "hnotrust".to_string(),
            protected_host: "serv1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpSettings {
    /// Hardware address the proxy answers with
    pub proxy_mac: MacAddr,
    /// Only answer for addresses present in the host table
    pub require_known_target: bool,
}

impl Default for ArpSettings {
    fn default() -> Self {
        Self {
            proxy_mac: MacAddr::new(0x01, 0x02, 0x03, 0x04, 0x05, 0x06),
            require_known_target: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub profile: PolicyProfile,
    pub hosts: Vec<HostEntry>,
    pub switches: Vec<SwitchEntry>,
    pub firewall: FirewallSettings,
    pub arp: ArpSettings,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            profile: PolicyProfile::default(),
            hosts: default_hosts(),
            switches: default_switches(),
            firewall: FirewallSettings::default(),
            arp: ArpSettings::default(),
        }
    }
}

impl PolicySettings {
    /// Load from an optional TOML file plus `SDN_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, PolicyError> {
        Ok(sdn_core::config::load_settings(path, ENV_PREFIX)?)
    }
}

fn host(name: &str, address: [u8; 4], prefix: u8) -> HostEntry {
    let address = Ipv4Addr::from(address);
    HostEntry {
        name: name.to_string(),
        address,
        subnet: Ipv4Net::new(address, prefix)
            .map(|net| net.trunc())
            .unwrap_or_else(|_| Ipv4Net::from(address)),
    }
}

fn default_hosts() -> Vec<HostEntry> {
    vec![
        host("h10", [10, 0, 1, 10], 24),
        host("h20", [10, 0, 2, 20], 24),
        host("h30", [10, 0, 3, 30], 24),
        host("serv1", [10, 0, 4, 10], 24),
        host("hnotrust", [172, 16, 10, 100], 24),
    ]
}

fn default_switches() -> Vec<SwitchEntry> {
    [
        (1, Role::Edge),
        (2, Role::Edge),
        (3, Role::Edge),
        (21, Role::Core),
        (31, Role::Datacenter),
    ]
    .into_iter()
    .map(|(dpid, role)| SwitchEntry {
        dpid,
        role,
        proxy_mac: None,
    })
    .collect()
}
