//! OpenFlow 1.0 style flow model
//!
//! Flow mods and packet-outs as the policy engine builds them. Encoding
//! onto the control channel belongs to the transport; these types only
//! carry intent. `Display` renders rules in `ovs-ofctl` syntax for logs.

use sdn_core::{MacAddr, PortNo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::packet::{EthernetFrame, ETH_TYPE_ARP, ETH_TYPE_IPV4, IP_PROTO_ICMP};

/// Match criteria; `None` fields are wildcarded
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dl_type: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nw_proto: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nw_src: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nw_dst: Option<Ipv4Addr>,
}

impl FlowMatch {
    /// Wildcard everything
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_dl_type(mut self, dl_type: u16) -> Self {
        self.dl_type = Some(dl_type);
        self
    }

    pub fn with_nw_proto(mut self, proto: u8) -> Self {
        self.nw_proto = Some(proto);
        self
    }

    pub fn with_nw_src(mut self, src: Ipv4Addr) -> Self {
        self.nw_src = Some(src);
        self
    }

    pub fn with_nw_dst(mut self, dst: Ipv4Addr) -> Self {
        self.nw_dst = Some(dst);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::default()
    }

    /// Whether a frame would hit this match on a switch.
    ///
    /// Network-layer fields only apply to IPv4 frames; for ARP the
    /// OpenFlow 1.0 nw_src/nw_dst/nw_proto map to spa/tpa/opcode.
    pub fn matches(&self, frame: &EthernetFrame) -> bool {
        if self.dl_type.is_some_and(|t| t != frame.ethertype()) {
            return false;
        }

        if let Some(ip) = frame.ipv4() {
            return self.nw_proto.map_or(true, |p| p == ip.protocol)
                && self.nw_src.map_or(true, |s| s == ip.src)
                && self.nw_dst.map_or(true, |d| d == ip.dst);
        }

        if let Some(arp) = frame.arp() {
            return self
                .nw_proto
                .map_or(true, |p| u16::from(p) == arp.op.to_raw())
                && self.nw_src.map_or(true, |s| s == arp.sender_ip)
                && self.nw_dst.map_or(true, |d| d == arp.target_ip);
        }

        self.nw_proto.is_none() && self.nw_src.is_none() && self.nw_dst.is_none()
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        match (self.dl_type, self.nw_proto) {
            (Some(ETH_TYPE_IPV4), Some(IP_PROTO_ICMP)) => parts.push("icmp".to_string()),
            (Some(ETH_TYPE_IPV4), proto) => {
                parts.push("ip".to_string());
                if let Some(p) = proto {
                    parts.push(format!("nw_proto={}", p));
                }
            }
            (Some(ETH_TYPE_ARP), proto) => {
                parts.push("arp".to_string());
                if let Some(p) = proto {
                    parts.push(format!("arp_op={}", p));
                }
            }
            (Some(other), proto) => {
                parts.push(format!("dl_type={:#06x}", other));
                if let Some(p) = proto {
                    parts.push(format!("nw_proto={}", p));
                }
            }
            (None, Some(p)) => parts.push(format!("nw_proto={}", p)),
            (None, None) => {}
        }
        if let Some(src) = self.nw_src {
            parts.push(format!("nw_src={}", src));
        }
        if let Some(dst) = self.nw_dst {
            parts.push(format!("nw_dst={}", dst));
        }
        write!(f, "{}", parts.join(","))
    }
}

/// Flow or packet-out action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "arg", rename_all = "snake_case")]
pub enum FlowAction {
    /// All ports except ingress and ports with OFPPC_NO_FLOOD set
    Flood,
    Output(PortNo),
    SetDlDst(MacAddr),
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAction::Flood => write!(f, "FLOOD"),
            FlowAction::Output(port) => write!(f, "output:{}", port),
            FlowAction::SetDlDst(mac) => write!(f, "mod_dl_dst:{}", mac),
        }
    }
}

/// A flow-table entry (OFPFC_ADD)
///
/// An empty action list drops matching traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRule {
    pub priority: u16,
    #[serde(rename = "match")]
    pub flow_match: FlowMatch,
    #[serde(default)]
    pub actions: Vec<FlowAction>,
}

impl FlowRule {
    pub fn new(priority: u16, flow_match: FlowMatch, actions: Vec<FlowAction>) -> Self {
        Self {
            priority,
            flow_match,
            actions,
        }
    }

    pub fn drop(priority: u16, flow_match: FlowMatch) -> Self {
        Self::new(priority, flow_match, Vec::new())
    }

    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_flood(&self) -> bool {
        self.actions == [FlowAction::Flood]
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "priority={}", self.priority)?;
        if !self.flow_match.is_wildcard() {
            write!(f, ",{}", self.flow_match)?;
        }
        if self.actions.is_empty() {
            return write!(f, ",actions=drop");
        }
        let actions: Vec<String> = self.actions.iter().map(ToString::to_string).collect();
        write!(f, ",actions={}", actions.join(","))
    }
}

/// Frame injected by the controller through a switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketOut {
    pub frame: EthernetFrame,
    pub actions: Vec<FlowAction>,
}

impl PacketOut {
    pub fn to_port(frame: EthernetFrame, port: PortNo) -> Self {
        Self {
            frame,
            actions: vec![FlowAction::Output(port)],
        }
    }
}

/// Everything the controller sends to a switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerMessage {
    FlowMod(FlowRule),
    PacketOut(PacketOut),
}

impl ControllerMessage {
    pub fn as_flow_mod(&self) -> Option<&FlowRule> {
        match self {
            ControllerMessage::FlowMod(rule) => Some(rule),
            ControllerMessage::PacketOut(_) => None,
        }
    }

    pub fn as_packet_out(&self) -> Option<&PacketOut> {
        match self {
            ControllerMessage::PacketOut(out) => Some(out),
            ControllerMessage::FlowMod(_) => None,
        }
    }
}
