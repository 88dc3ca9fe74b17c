//! sdn-network: the switch-facing side of the controller
//!
//! This crate provides:
//! - OpenFlow 1.0 style flow model (matches, actions, flow mods, packet-outs)
//! - The `SwitchConnection` handle the policy engine sends through
//! - Packet-in events and the Ethernet/ARP/IPv4 frame model with a small codec

pub mod connection;
pub mod error;
pub mod openflow;
pub mod packet;

pub use connection::{PacketIn, SwitchConnection};
pub use error::NetworkError;
pub use openflow::{ControllerMessage, FlowAction, FlowMatch, FlowRule, PacketOut};
pub use packet::{ArpOp, ArpPacket, EthernetFrame, Ipv4Packet, Payload};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::connection::{PacketIn, SwitchConnection};
    pub use super::error::NetworkError;
    pub use super::openflow::{ControllerMessage, FlowAction, FlowMatch, FlowRule, PacketOut};
    pub use super::packet::{ArpOp, ArpPacket, EthernetFrame, Ipv4Packet, Payload};
}
