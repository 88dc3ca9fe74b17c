//! Channel-backed switch connections
//!
//! Every message the controller sends is pushed onto one unbounded channel
//! as an `OutboundMessage`; a writer task drains it to stdout as JSON lines.

use sdn_core::Dpid;
use sdn_network::{ControllerMessage, NetworkError, SwitchConnection};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub dpid: Dpid,
    pub message: ControllerMessage,
}

pub type OutboundSender = mpsc::UnboundedSender<OutboundMessage>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundMessage>;

pub struct ChannelConnection {
    dpid: Dpid,
    tx: OutboundSender,
    closed: AtomicBool,
}

impl ChannelConnection {
    pub fn new(dpid: Dpid, tx: OutboundSender) -> Self {
        Self {
            dpid,
            tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Stop accepting messages; later sends fail with `ConnectionClosed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SwitchConnection for ChannelConnection {
    fn dpid(&self) -> Dpid {
        self.dpid
    }

    fn send(&self, message: ControllerMessage) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed(self.dpid));
        }
        self.tx
            .send(OutboundMessage {
                dpid: self.dpid,
                message,
            })
            .map_err(|_| NetworkError::send(self.dpid, "outbound channel closed"))
    }
}

/// Drain the channel into `out`, one JSON object per line.
/// Resolves with the number of messages written once every sender is gone.
pub fn spawn_writer<W>(mut rx: OutboundReceiver, mut out: W) -> JoinHandle<usize>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut written = 0;
        while let Some(msg) = rx.recv().await {
            let mut line = match serde_json::to_vec(&msg) {
                Ok(line) => line,
                Err(e) => {
                    error!(dpid = msg.dpid, "Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = out.write_all(&line).await {
                error!("Failed to write outbound message: {}", e);
                break;
            }
            written += 1;
        }
        if let Err(e) = out.flush().await {
            error!("Failed to flush outbound messages: {}", e);
        }
        debug!(written, "Outbound writer finished");
        written
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdn_network::{FlowAction, FlowMatch, FlowRule};
    use tokio::io::AsyncReadExt;

    fn flood() -> FlowRule {
        FlowRule::new(1, FlowMatch::any(), vec![FlowAction::Flood])
    }

    #[test]
    fn test_send_after_close_fails() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = ChannelConnection::new(7, tx);

        conn.send_flow_mod(flood()).unwrap();
        conn.close();
        assert_eq!(
            conn.send_flow_mod(flood()),
            Err(NetworkError::ConnectionClosed(7))
        );

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.dpid, 7);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_without_receiver_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let conn = ChannelConnection::new(3, tx);
        let err = conn.send_flow_mod(flood()).unwrap_err();
        assert!(matches!(err, NetworkError::Send { dpid: 3, .. }));
    }

    #[tokio::test]
    async fn test_writer_emits_json_lines() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sink, mut reader) = tokio::io::duplex(64 * 1024);
        let writer = spawn_writer(rx, sink);

        let conn = ChannelConnection::new(21, tx);
        conn.send_flow_mod(flood()).unwrap();
        conn.send_flow_mod(flood()).unwrap();
        drop(conn);

        assert_eq!(writer.await.unwrap(), 2);

        let mut text = String::new();
        reader.read_to_string(&mut text).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: OutboundMessage = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.dpid, 21);
        assert_eq!(parsed.message.as_flow_mod(), Some(&flood()));
    }
}
