//! Switch roles and the datapath-id → role map

use sdn_core::Dpid;
use sdn_network::{FlowRule, SwitchConnection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::PolicyError;
use crate::firewall::FirewallPolicy;
use crate::installer;
use crate::settings::SwitchEntry;

/// Behavioral class of a switch, fixed by its position in the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Access switch in front of a host subnet
    Edge,
    /// Aggregation switch: firewall and ARP proxy
    Core,
    /// Switch in front of the server subnet
    Datacenter,
}

impl Role {
    /// Rules a switch of this role receives on connect
    pub fn baseline_rules(self, firewall: &FirewallPolicy) -> Vec<FlowRule> {
        match self {
            Role::Edge | Role::Datacenter => vec![installer::default_flood_rule()],
            Role::Core => firewall.rules(),
        }
    }

    /// Push the baseline rules for this role
    pub fn install_baseline(
        self,
        conn: &dyn SwitchConnection,
        firewall: &FirewallPolicy,
    ) -> Result<usize, PolicyError> {
        match self {
            Role::Edge | Role::Datacenter => installer::install_default_flood(conn).map(|()| 1),
            // No flood rule here: unmatched traffic goes to the controller.
            Role::Core => firewall.install(conn),
        }
    }

    /// Whether packet-ins from this switch are offered to the ARP proxy
    pub fn proxies_arp(self) -> bool {
        matches!(self, Role::Core)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Edge => write!(f, "edge"),
            Role::Core => write!(f, "core"),
            Role::Datacenter => write!(f, "datacenter"),
        }
    }
}

/// Fixed map from datapath id to role
#[derive(Debug, Clone, Default)]
pub struct RoleResolver {
    roles: HashMap<Dpid, Role>,
}

impl RoleResolver {
    /// Rejects a dpid that appears more than once, even with the same role
    pub fn new(roles: impl IntoIterator<Item = (Dpid, Role)>) -> Result<Self, PolicyError> {
        let mut map = HashMap::new();
        for (dpid, role) in roles {
            if let Some(first) = map.insert(dpid, role) {
                return Err(PolicyError::DuplicateSwitch {
                    dpid,
                    first,
                    second: role,
                });
            }
        }
        Ok(Self { roles: map })
    }

    pub fn from_entries(entries: &[SwitchEntry]) -> Result<Self, PolicyError> {
        Self::new(entries.iter().map(|e| (e.dpid, e.role)))
    }

    /// `None` means the switch is not part of the managed topology
    pub fn resolve_role(&self, dpid: Dpid) -> Option<Role> {
        self.roles.get(&dpid).copied()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
