//! Switch session controller
//!
//! Owns one `SwitchSession` per connected switch and dispatches lifecycle
//! and packet-in events to the role resolver, rule installer, firewall and
//! ARP proxy. Handlers run to completion and never block.

use sdn_core::Dpid;
use sdn_network::{FlowRule, PacketIn, SwitchConnection};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::arp_proxy::{ArpProxy, ProxyOutcome};
use crate::directory::AddressDirectory;
use crate::error::PolicyError;
use crate::firewall::FirewallPolicy;
use crate::installer;
use crate::roles::{Role, RoleResolver};
use crate::session::SwitchSession;
use crate::settings::{PolicyProfile, PolicySettings};

/// Receiver for switch events, implemented by the controller
pub trait SwitchEventHandler: Send {
    fn switch_connected(
        &mut self,
        dpid: Dpid,
        connection: Arc<dyn SwitchConnection>,
    ) -> Result<(), PolicyError>;

    fn switch_disconnected(&mut self, dpid: Dpid);

    fn packet_in(&mut self, event: PacketIn) -> Result<(), PolicyError>;
}

/// Something that delivers switch events to a registered handler
pub trait EventSource {
    fn register(&mut self, handler: Box<dyn SwitchEventHandler>);
}

/// Register the controller with the event source
pub fn start<S: EventSource + ?Sized>(source: &mut S, controller: SwitchSessionController) {
    info!(
        profile = ?controller.profile,
        switches = controller.resolver.len(),
        hosts = controller.directory.len(),
        "Starting switch session controller"
    );
    source.register(Box::new(controller));
}

pub struct SwitchSessionController {
    profile: PolicyProfile,
    directory: Arc<AddressDirectory>,
    resolver: RoleResolver,
    firewall: FirewallPolicy,
    arp_proxy: ArpProxy,
    sessions: HashMap<Dpid, SwitchSession>,
}

impl SwitchSessionController {
    pub fn new(
        profile: PolicyProfile,
        directory: Arc<AddressDirectory>,
        resolver: RoleResolver,
        firewall: FirewallPolicy,
        arp_proxy: ArpProxy,
    ) -> Self {
        Self {
            profile,
            directory,
            resolver,
            firewall,
            arp_proxy,
            sessions: HashMap::new(),
        }
    }

    pub fn from_settings(settings: &PolicySettings) -> Result<Self, PolicyError> {
        let directory = Arc::new(AddressDirectory::from_entries(&settings.hosts)?);
        let firewall = FirewallPolicy::from_directory(&directory, &settings.firewall)?;
        let resolver = RoleResolver::from_entries(&settings.switches)?;
        let arp_proxy = ArpProxy::from_settings(settings, directory.clone());

        Ok(Self::new(
            settings.profile,
            directory,
            resolver,
            firewall,
            arp_proxy,
        ))
    }

    pub fn profile(&self) -> PolicyProfile {
        self.profile
    }

    pub fn directory(&self) -> &AddressDirectory {
        &self.directory
    }

    pub fn session(&self, dpid: Dpid) -> Option<&SwitchSession> {
        self.sessions.get(&dpid)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Role a switch gets under the current profile; `Ok(None)` when roles don't apply
    fn role_for(&self, dpid: Dpid) -> Result<Option<Role>, PolicyError> {
        match self.profile {
            PolicyProfile::IcmpArpOnly => Ok(None),
            PolicyProfile::Segmented => self
                .resolver
                .resolve_role(dpid)
                .map(Some)
                .ok_or(PolicyError::UnknownSwitch(dpid)),
        }
    }

    /// Rules a switch receives on connect, without sending anything
    pub fn baseline_rules(&self, dpid: Dpid) -> Result<Vec<FlowRule>, PolicyError> {
        Ok(match self.role_for(dpid)? {
            Some(role) => role.baseline_rules(&self.firewall),
            None => installer::icmp_arp_flood_rules(),
        })
    }

    fn install_baseline(
        &self,
        conn: &dyn SwitchConnection,
        role: Option<Role>,
    ) -> Result<usize, PolicyError> {
        match role {
            Some(role) => role.install_baseline(conn, &self.firewall),
            None => installer::install_all(conn, installer::icmp_arp_flood_rules()),
        }
    }

    /// Re-run setup on an existing session.
    ///
    /// Rules are deterministic per switch, so this leaves the flow table as
    /// a single setup would.
    pub fn configure(&mut self, dpid: Dpid) -> Result<(), PolicyError> {
        let role = self.role_for(dpid)?;
        let Some(conn) = self.sessions.get(&dpid).and_then(|s| s.connection()).cloned() else {
            return Err(PolicyError::NoSession(dpid));
        };

        let result = self.install_baseline(conn.as_ref(), role);
        if let Some(session) = self.sessions.get_mut(&dpid) {
            session.mark_configured(role);
        }
        result.map(|installed| {
            debug!(dpid, installed, "Baseline rules installed");
        })
    }
}

impl SwitchEventHandler for SwitchSessionController {
    fn switch_connected(
        &mut self,
        dpid: Dpid,
        connection: Arc<dyn SwitchConnection>,
    ) -> Result<(), PolicyError> {
        info!(dpid, "Switch connected");

        let role = match self.role_for(dpid) {
            Ok(role) => role,
            Err(e) => {
                error!(dpid, "Refusing session: {}", e);
                return Err(e);
            }
        };

        if let Some(mut previous) = self.sessions.remove(&dpid) {
            warn!(dpid, state = ?previous.state(), "Switch reconnected, replacing session");
            previous.close();
        }

        let mut session = SwitchSession::connecting(dpid, connection.clone());
        let result = self.install_baseline(connection.as_ref(), role);
        session.mark_configured(role);
        self.sessions.insert(dpid, session);

        match role {
            Some(role) => info!(dpid, %role, "Switch configured"),
            None => info!(dpid, "Switch configured with ICMP/ARP flood rules"),
        }
        result.map(|installed| {
            debug!(dpid, installed, "Baseline rules installed");
        })
    }

    fn switch_disconnected(&mut self, dpid: Dpid) {
        match self.sessions.remove(&dpid) {
            Some(mut session) => {
                session.close();
                info!(dpid, "Switch disconnected, session closed");
            }
            None => debug!(dpid, "Disconnect for switch without a session"),
        }
    }

    fn packet_in(&mut self, event: PacketIn) -> Result<(), PolicyError> {
        let dpid = event.dpid;
        let Some(session) = self.sessions.get(&dpid).filter(|s| s.is_configured()) else {
            warn!(dpid, "Packet-in from switch without a configured session, dropping");
            return Ok(());
        };
        let Some(frame) = event.frame.as_ref() else {
            warn!(dpid, in_port = event.in_port, "Ignoring incomplete packet");
            return Ok(());
        };

        if session.role().is_some_and(Role::proxies_arp) {
            if let Some(conn) = session.connection() {
                if self.arp_proxy.handle(conn.as_ref(), &event)? == ProxyOutcome::Replied {
                    return Ok(());
                }
            }
        }

        info!(
            dpid,
            in_port = event.in_port,
            "Unhandled packet: {}",
            frame
        );
        Ok(())
    }
}
