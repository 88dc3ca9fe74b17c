//! Switch connection handle and packet-in events
//!
//! The transport that owns the control channel implements
//! `SwitchConnection`; the policy engine only ever calls `send`.

use sdn_core::{Dpid, PortNo};
use tracing::debug;

use crate::error::NetworkError;
use crate::openflow::{ControllerMessage, FlowRule, PacketOut};
use crate::packet::EthernetFrame;

/// Handle to one connected switch.
///
/// `send` must not block: implementations queue the message for the
/// control channel and return. An `Err` means the message was not queued.
pub trait SwitchConnection: Send + Sync {
    /// Datapath id of the switch on the other end
    fn dpid(&self) -> Dpid;

    /// Queue a message for the switch
    fn send(&self, message: ControllerMessage) -> Result<(), NetworkError>;

    fn send_flow_mod(&self, rule: FlowRule) -> Result<(), NetworkError> {
        self.send(ControllerMessage::FlowMod(rule))
    }

    fn send_packet_out(&self, packet_out: PacketOut) -> Result<(), NetworkError> {
        self.send(ControllerMessage::PacketOut(packet_out))
    }
}

/// A frame a switch forwarded because no flow matched it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub dpid: Dpid,
    pub in_port: PortNo,
    /// `None` when the frame could not be decoded
    pub frame: Option<EthernetFrame>,
}

impl PacketIn {
    pub fn new(dpid: Dpid, in_port: PortNo, frame: EthernetFrame) -> Self {
        Self {
            dpid,
            in_port,
            frame: Some(frame),
        }
    }

    /// Decode raw packet-in data; undecodable frames are kept as incomplete
    pub fn decode(dpid: Dpid, in_port: PortNo, data: &[u8]) -> Self {
        let frame = match EthernetFrame::parse(data) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!(dpid, in_port, "Packet-in data not decodable: {}", e);
                None
            }
        };
        Self {
            dpid,
            in_port,
            frame,
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.frame.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow::{FlowAction, FlowMatch};
    use std::sync::Mutex;

    struct Capture {
        sent: Mutex<Vec<ControllerMessage>>,
    }

    impl SwitchConnection for Capture {
        fn dpid(&self) -> Dpid {
            7
        }

        fn send(&self, message: ControllerMessage) -> Result<(), NetworkError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[test]
    fn test_send_flow_mod_wraps_message() {
        let conn = Capture {
            sent: Mutex::new(Vec::new()),
        };
        let rule = FlowRule::new(1, FlowMatch::any(), vec![FlowAction::Flood]);
        conn.send_flow_mod(rule.clone()).unwrap();

        let sent = conn.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].as_flow_mod(), Some(&rule));
    }

    #[test]
    fn test_decode_incomplete_packet() {
        let event = PacketIn::decode(1, 2, &[0u8; 4]);
        assert!(!event.is_parsed());
        assert_eq!(event.in_port, 2);
    }
}
