//! Per-switch session: connection handle plus lifecycle state

use sdn_core::Dpid;
use sdn_network::SwitchConnection;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::roles::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Configured,
    Closed,
}

pub struct SwitchSession {
    dpid: Dpid,
    role: Option<Role>,
    connection: Option<Arc<dyn SwitchConnection>>,
    state: SessionState,
}

impl SwitchSession {
    pub fn connecting(dpid: Dpid, connection: Arc<dyn SwitchConnection>) -> Self {
        Self {
            dpid,
            role: None,
            connection: Some(connection),
            state: SessionState::Connecting,
        }
    }

    pub fn dpid(&self) -> Dpid {
        self.dpid
    }

    /// `None` until configured, and always `None` in the ICMP/ARP-only profile
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_configured(&self) -> bool {
        self.state == SessionState::Configured
    }

    /// Live connection; gone once the session is closed
    pub fn connection(&self) -> Option<&Arc<dyn SwitchConnection>> {
        self.connection.as_ref()
    }

    pub(crate) fn mark_configured(&mut self, role: Option<Role>) {
        self.role = role;
        self.state = SessionState::Configured;
    }

    /// Drop the connection handle; rules stay on the switch
    pub fn close(&mut self) {
        self.connection = None;
        self.state = SessionState::Closed;
    }
}

impl fmt::Debug for SwitchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchSession")
            .field("dpid", &self.dpid)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}
