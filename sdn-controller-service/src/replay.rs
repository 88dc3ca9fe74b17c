//! Switch event replay
//!
//! Reads a JSON-lines event log and feeds it through the registered
//! controller. One event per line:
//!
//! ```text
//! {"event":"connect","dpid":21}
//! {"event":"packet_in","dpid":21,"in_port":1,"data":"ffffffffffff..."}
//! {"event":"packet_in","dpid":21,"in_port":1,"frame":{"dst":"ff:ff:ff:ff:ff:ff",...}}
//! {"event":"disconnect","dpid":21}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use anyhow::{bail, Result};
use sdn_core::{Dpid, PortNo};
use sdn_network::{EthernetFrame, PacketIn};
use sdn_policy::{EventSource, PolicyError, SwitchEventHandler};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn};

use crate::recorder::{ChannelConnection, OutboundSender};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SwitchEvent {
    Connect {
        dpid: Dpid,
    },
    PacketIn {
        dpid: Dpid,
        in_port: PortNo,
        /// Structured frame
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame: Option<EthernetFrame>,
        /// Raw frame bytes as hex
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    Disconnect {
        dpid: Dpid,
    },
}

impl SwitchEvent {
    pub fn dpid(&self) -> Dpid {
        match self {
            SwitchEvent::Connect { dpid }
            | SwitchEvent::PacketIn { dpid, .. }
            | SwitchEvent::Disconnect { dpid } => *dpid,
        }
    }
}

/// Build the packet-in a switch would have delivered. Bad hex or missing
/// frame data yields an incomplete packet.
fn packet_in(
    dpid: Dpid,
    in_port: PortNo,
    frame: Option<EthernetFrame>,
    data: Option<String>,
) -> PacketIn {
    if let Some(frame) = frame {
        return PacketIn::new(dpid, in_port, frame);
    }
    match data.as_deref().map(decode_hex) {
        Some(Some(bytes)) => PacketIn::decode(dpid, in_port, &bytes),
        Some(None) => {
            debug!(dpid, in_port, "Packet-in data is not valid hex");
            PacketIn::decode(dpid, in_port, &[])
        }
        None => PacketIn::decode(dpid, in_port, &[]),
    }
}

/// Hex string to bytes; `:`, `-` and whitespace separators are ignored
fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let digits: String = s
        .chars()
        .filter(|c| !matches!(c, ':' | '-') && !c.is_whitespace())
        .collect();
    hex::decode(digits).ok()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub skipped: usize,
    pub errors: usize,
    pub security_degraded: usize,
}

/// Event source backed by a recorded event log
pub struct ReplaySource {
    handler: Option<Box<dyn SwitchEventHandler>>,
    tx: OutboundSender,
    connections: HashMap<Dpid, Arc<ChannelConnection>>,
    report: ReplayReport,
}

impl EventSource for ReplaySource {
    fn register(&mut self, handler: Box<dyn SwitchEventHandler>) {
        if self.handler.replace(handler).is_some() {
            warn!("Replacing previously registered event handler");
        }
    }
}

impl ReplaySource {
    pub fn new(tx: OutboundSender) -> Self {
        Self {
            handler: None,
            tx,
            connections: HashMap::new(),
            report: ReplayReport::default(),
        }
    }

    /// Deliver one event to the handler
    pub fn dispatch(&mut self, event: SwitchEvent) -> Result<(), PolicyError> {
        let Some(handler) = self.handler.as_deref_mut() else {
            warn!(dpid = event.dpid(), "No handler registered, event dropped");
            return Ok(());
        };

        match event {
            SwitchEvent::Connect { dpid } => {
                let conn = Arc::new(ChannelConnection::new(dpid, self.tx.clone()));
                if let Some(previous) = self.connections.insert(dpid, conn.clone()) {
                    previous.close();
                }
                let result = handler.switch_connected(dpid, conn.clone());
                if matches!(result, Err(PolicyError::UnknownSwitch(_))) {
                    conn.close();
                    self.connections.remove(&dpid);
                }
                result
            }
            SwitchEvent::PacketIn {
                dpid,
                in_port,
                frame,
                data,
            } => handler.packet_in(packet_in(dpid, in_port, frame, data)),
            SwitchEvent::Disconnect { dpid } => {
                if let Some(conn) = self.connections.remove(&dpid) {
                    conn.close();
                }
                handler.switch_disconnected(dpid);
                Ok(())
            }
        }
    }

    /// Replay every event in `reader`. Handler errors are logged and
    /// counted; only read errors abort the replay.
    pub async fn replay<R>(&mut self, reader: R) -> Result<ReplayReport>
    where
        R: AsyncBufRead + Unpin,
    {
        if self.handler.is_none() {
            bail!("no event handler registered");
        }

        let mut lines = reader.lines();
        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let event: SwitchEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(line = line_no, "Skipping unreadable event: {}", e);
                    self.report.skipped += 1;
                    continue;
                }
            };

            self.report.events += 1;
            if let Err(e) = self.dispatch(event) {
                self.report.errors += 1;
                if e.is_security_degraded() {
                    self.report.security_degraded += 1;
                    error!(line = line_no, dpid = ?e.dpid(), "Firewall degraded: {}", e);
                } else {
                    warn!(line = line_no, dpid = ?e.dpid(), "Event failed: {}", e);
                }
            }
        }

        info!(
            events = self.report.events,
            skipped = self.report.skipped,
            errors = self.report.errors,
            "Replay finished"
        );
        Ok(self.report.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::OutboundMessage;
    use sdn_network::FlowAction;
    use sdn_policy::{start, PolicySettings, SwitchSessionController};
    use tokio::io::BufReader;
    use tokio::sync::mpsc;

    const H10_TO_SERV1_WHO_HAS: &str = "ffffffffffff aaaaaaaaaa01 0806 \
        0001 0800 06 04 0001 aaaaaaaaaa01 0a00010a 000000000000 0a00040a";

    fn started() -> (ReplaySource, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut source = ReplaySource::new(tx);
        let controller =
            SwitchSessionController::from_settings(&PolicySettings::default()).unwrap();
        start(&mut source, controller);
        (source, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("0a:0B-ff"), Some(vec![0x0a, 0x0b, 0xff]));
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
        assert_eq!(decode_hex(""), Some(vec![]));
    }

    #[test]
    fn test_parse_events() {
        let event: SwitchEvent = serde_json::from_str(r#"{"event":"connect","dpid":21}"#).unwrap();
        assert_eq!(event, SwitchEvent::Connect { dpid: 21 });

        let event: SwitchEvent =
            serde_json::from_str(r#"{"event":"packet_in","dpid":1,"in_port":3,"data":"00"}"#)
                .unwrap();
        assert_eq!(event.dpid(), 1);
        assert!(matches!(event, SwitchEvent::PacketIn { frame: None, .. }));
    }

    #[tokio::test]
    async fn test_replay_arp_exchange() {
        let (mut source, mut rx) = started();
        let log = format!(
            "# core switch comes up\n\
             {{\"event\":\"connect\",\"dpid\":21}}\n\
             \n\
             {{\"event\":\"packet_in\",\"dpid\":21,\"in_port\":1,\"data\":\"{}\"}}\n\
             {{\"event\":\"disconnect\",\"dpid\":21}}\n",
            H10_TO_SERV1_WHO_HAS
        );

        let report = source.replay(BufReader::new(log.as_bytes())).await.unwrap();
        assert_eq!(report.events, 3);
        assert_eq!(report.errors, 0);

        let sent = drain(&mut rx);
        assert!(sent.iter().all(|m| m.dpid == 21));
        // two block rules, the learned route, the reply
        assert_eq!(sent.len(), 4);

        let reply = sent.iter().find_map(|m| m.message.as_packet_out()).unwrap();
        assert_eq!(reply.actions, vec![FlowAction::Output(1)]);
        let arp = reply.frame.arp().unwrap();
        assert_eq!(arp.sender_ip.to_string(), "10.0.4.10");
        assert_eq!(arp.target_ip.to_string(), "10.0.1.10");
    }

    #[tokio::test]
    async fn test_replay_counts_failures_and_continues() {
        let (mut source, mut rx) = started();
        let log = "{\"event\":\"connect\",\"dpid\":99}\n\
                   not json\n\
                   {\"event\":\"connect\",\"dpid\":1}\n";

        let report = source.replay(BufReader::new(log.as_bytes())).await.unwrap();
        assert_eq!(
            report,
            ReplayReport {
                events: 2,
                skipped: 1,
                errors: 1,
                security_degraded: 0,
            }
        );

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dpid, 1);
    }

    #[tokio::test]
    async fn test_packet_in_after_disconnect_sends_nothing() {
        let (mut source, mut rx) = started();
        source.dispatch(SwitchEvent::Connect { dpid: 21 }).unwrap();
        source.dispatch(SwitchEvent::Disconnect { dpid: 21 }).unwrap();
        drain(&mut rx);

        source
            .dispatch(SwitchEvent::PacketIn {
                dpid: 21,
                in_port: 1,
                frame: None,
                data: Some(H10_TO_SERV1_WHO_HAS.to_string()),
            })
            .unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_replay_demo_log() {
        let (mut source, mut rx) = started();
        let log = include_str!("../../demos/reference_topology.jsonl");

        let report = source.replay(BufReader::new(log.as_bytes())).await.unwrap();
        assert_eq!(report.events, 9);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.errors, 1);

        let sent = drain(&mut rx);
        let flow_mods = sent.iter().filter(|m| m.message.as_flow_mod().is_some()).count();
        let packet_outs = sent.iter().filter(|m| m.message.as_packet_out().is_some()).count();
        // 4 flood + 2 block rules, then a route and a reply per request
        assert_eq!(flow_mods, 8);
        assert_eq!(packet_outs, 2);
        assert!(sent.iter().all(|m| m.dpid != 99));
    }

    #[tokio::test]
    async fn test_replay_without_handler_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut source = ReplaySource::new(tx);
        assert!(source.replay(BufReader::new(&b""[..])).await.is_err());
    }
}
