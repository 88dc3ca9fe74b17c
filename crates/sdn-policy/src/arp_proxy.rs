//! Proxy ARP for the core switch
//!
//! ARP requests that reach the controller are answered directly with the
//! switch's proxy hardware address instead of being flooded. Each answer
//! also installs a route back to the requester, so later IPv4 traffic for
//! it is forwarded by the switch without a controller round-trip.

use sdn_core::{Dpid, MacAddr, PortNo};
use sdn_network::packet::ETH_TYPE_IPV4;
use sdn_network::{
    ArpOp, ArpPacket, EthernetFrame, FlowAction, FlowMatch, FlowRule, PacketIn, PacketOut,
    Payload, SwitchConnection,
};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::directory::AddressDirectory;
use crate::error::PolicyError;
use crate::installer::{self, PRIORITY_PROXY_ROUTE};
use crate::settings::PolicySettings;

/// What the proxy did with a packet-in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// Reply sent and route installed
    Replied,
    /// Not an ARP request the proxy answers; caller decides what to do
    NotClaimed,
}

#[derive(Debug, Clone)]
pub struct ArpProxy {
    default_mac: MacAddr,
    switch_macs: HashMap<Dpid, MacAddr>,
    directory: Arc<AddressDirectory>,
    require_known_target: bool,
}

impl ArpProxy {
    pub fn new(default_mac: MacAddr, directory: Arc<AddressDirectory>) -> Self {
        Self {
            default_mac,
            switch_macs: HashMap::new(),
            directory,
            require_known_target: false,
        }
    }

    pub fn from_settings(settings: &PolicySettings, directory: Arc<AddressDirectory>) -> Self {
        let mut proxy = Self::new(settings.arp.proxy_mac, directory)
            .require_known_target(settings.arp.require_known_target);
        for entry in &settings.switches {
            if let Some(mac) = entry.proxy_mac {
                proxy = proxy.with_switch_mac(entry.dpid, mac);
            }
        }
        proxy
    }

    pub fn with_switch_mac(mut self, dpid: Dpid, mac: MacAddr) -> Self {
        self.switch_macs.insert(dpid, mac);
        self
    }

    /// Only answer for addresses in the directory
    pub fn require_known_target(mut self, require: bool) -> Self {
        self.require_known_target = require;
        self
    }

    /// Hardware address answered on behalf of `dpid`
    pub fn proxy_mac(&self, dpid: Dpid) -> MacAddr {
        self.switch_macs
            .get(&dpid)
            .copied()
            .unwrap_or(self.default_mac)
    }

    /// Reply frame for `request`, addressed to the requester's Ethernet source
    pub fn build_reply(&self, dpid: Dpid, requester: MacAddr, request: &ArpPacket) -> EthernetFrame {
        let proxy_mac = self.proxy_mac(dpid);
        EthernetFrame::new(
            requester,
            proxy_mac,
            Payload::Arp(ArpPacket {
                op: ArpOp::Reply,
                sender_hw: proxy_mac,
                sender_ip: request.target_ip,
                target_hw: requester,
                target_ip: request.sender_ip,
            }),
        )
    }

    /// IPv4 to the requester leaves through the port it asked from
    pub fn route_rule(requester_ip: Ipv4Addr, requester: MacAddr, in_port: PortNo) -> FlowRule {
        FlowRule::new(
            PRIORITY_PROXY_ROUTE,
            FlowMatch::any()
                .with_dl_type(ETH_TYPE_IPV4)
                .with_nw_dst(requester_ip),
            vec![FlowAction::SetDlDst(requester), FlowAction::Output(in_port)],
        )
    }

    /// Answer an ARP request if this packet-in carries one.
    ///
    /// The route is installed before the reply goes out. Both are attempted
    /// even if the route fails; a failed reply is reported ahead of it.
    pub fn handle(
        &self,
        conn: &dyn SwitchConnection,
        event: &PacketIn,
    ) -> Result<ProxyOutcome, PolicyError> {
        let Some(frame) = event.frame.as_ref() else {
            return Ok(ProxyOutcome::NotClaimed);
        };
        let Some(request) = frame.arp().filter(|arp| arp.op == ArpOp::Request) else {
            return Ok(ProxyOutcome::NotClaimed);
        };

        let dpid = conn.dpid();
        let src_ip = request.sender_ip;
        let dst_ip = request.target_ip;

        if self.require_known_target && self.directory.host_for_address(dst_ip).is_none() {
            debug!(dpid, %dst_ip, "ARP target not in directory, not answering");
            return Ok(ProxyOutcome::NotClaimed);
        }

        let requester = frame.src;
        let route = Self::route_rule(src_ip, requester, event.in_port);
        let route_result = installer::install_rule(conn, route);

        let reply = self.build_reply(dpid, requester, request);
        conn.send_packet_out(PacketOut::to_port(reply, event.in_port))
            .map_err(|source| {
                warn!(dpid, in_port = event.in_port, "ARP reply not sent: {}", source);
                PolicyError::PacketOut { dpid, source }
            })?;
        route_result?;

        info!(
            dpid,
            in_port = event.in_port,
            "Proxied ARP: {} is-at {} (asked by {} / {})",
            dst_ip,
            self.proxy_mac(dpid),
            src_ip,
            requester
        );
        Ok(ProxyOutcome::Replied)
    }
}
