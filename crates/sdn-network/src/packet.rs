//! Ethernet / ARP / IPv4 frame model
//!
//! Only what the policy engine looks at is decoded: the Ethernet header,
//! Ethernet/IPv4 ARP bodies, and the IPv4 header fields used for flow
//! matching. Anything else is carried as an opaque payload.
//!
//! # ARP body (RFC 826, Ethernet/IPv4)
//!
//! ```text
//! | htype (2) | ptype (2) | hlen (1) | plen (1) | oper (2) |
//! | sha (6) | spa (4) | tha (6) | tpa (4) |
//! ```

use byteorder::{BigEndian, ByteOrder};
use sdn_core::MacAddr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::NetworkError;

// ============================================================================
// Protocol Constants
// ============================================================================
pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

pub const ETH_HEADER_LEN: usize = 14;
pub const ARP_PACKET_LEN: usize = 28;
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// Largest payload behind an option-less header (16-bit total length)
pub const IPV4_MAX_PAYLOAD_LEN: usize = u16::MAX as usize - IPV4_MIN_HEADER_LEN;

const ARP_HTYPE_ETHERNET: u16 = 1;
const ARP_OPCODE_REQUEST: u16 = 1;
const ARP_OPCODE_REPLY: u16 = 2;
const IPV4_DEFAULT_TTL: u8 = 64;

// ============================================================================
// ARP
// ============================================================================

/// ARP operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArpOp {
    Request,
    Reply,
}

impl ArpOp {
    pub fn from_raw(op: u16) -> Option<Self> {
        match op {
            ARP_OPCODE_REQUEST => Some(ArpOp::Request),
            ARP_OPCODE_REPLY => Some(ArpOp::Reply),
            _ => None,
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            ArpOp::Request => ARP_OPCODE_REQUEST,
            ArpOp::Reply => ARP_OPCODE_REPLY,
        }
    }
}

/// Ethernet/IPv4 ARP body
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArpPacket {
    pub op: ArpOp,
    pub sender_hw: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_hw: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, NetworkError> {
        if buf.len() < ARP_PACKET_LEN {
            return Err(NetworkError::Truncated {
                what: "arp packet",
                needed: ARP_PACKET_LEN,
                got: buf.len(),
            });
        }

        let htype = BigEndian::read_u16(&buf[0..2]);
        let ptype = BigEndian::read_u16(&buf[2..4]);
        if htype != ARP_HTYPE_ETHERNET || ptype != ETH_TYPE_IPV4 {
            return Err(NetworkError::malformed(format!(
                "unsupported arp htype={} ptype={:#06x}",
                htype, ptype
            )));
        }
        if buf[4] != 6 || buf[5] != 4 {
            return Err(NetworkError::malformed(format!(
                "unsupported arp address lengths hlen={} plen={}",
                buf[4], buf[5]
            )));
        }

        let opcode = BigEndian::read_u16(&buf[6..8]);
        let op = ArpOp::from_raw(opcode)
            .ok_or_else(|| NetworkError::malformed(format!("unknown arp opcode {}", opcode)))?;

        Ok(ArpPacket {
            op,
            sender_hw: read_mac(&buf[8..14]),
            sender_ip: read_ipv4(&buf[14..18]),
            target_hw: read_mac(&buf[18..24]),
            target_ip: read_ipv4(&buf[24..28]),
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let mut fixed = [0u8; 8];
        BigEndian::write_u16(&mut fixed[0..2], ARP_HTYPE_ETHERNET);
        BigEndian::write_u16(&mut fixed[2..4], ETH_TYPE_IPV4);
        fixed[4] = 6;
        fixed[5] = 4;
        BigEndian::write_u16(&mut fixed[6..8], self.op.to_raw());
        out.extend_from_slice(&fixed);
        out.extend_from_slice(self.sender_hw.as_bytes());
        out.extend_from_slice(&self.sender_ip.octets());
        out.extend_from_slice(self.target_hw.as_bytes());
        out.extend_from_slice(&self.target_ip.octets());
    }
}

// ============================================================================
// IPv4
// ============================================================================

/// IPv4 packet, header fields relevant to matching plus the L4 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ipv4Packet {
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    #[serde(default = "default_ttl")]
    pub ttl: u8,
    #[serde(default)]
    pub payload: Vec<u8>,
}

fn default_ttl() -> u8 {
    IPV4_DEFAULT_TTL
}

impl Ipv4Packet {
    pub fn parse(buf: &[u8]) -> Result<Self, NetworkError> {
        if buf.len() < IPV4_MIN_HEADER_LEN {
            return Err(NetworkError::Truncated {
                what: "ipv4 header",
                needed: IPV4_MIN_HEADER_LEN,
                got: buf.len(),
            });
        }

        let version = buf[0] >> 4;
        if version != 4 {
            return Err(NetworkError::malformed(format!("ip version {}", version)));
        }
        let header_len = usize::from(buf[0] & 0x0f) * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(NetworkError::malformed(format!("ipv4 ihl {}", header_len / 4)));
        }
        if buf.len() < header_len {
            return Err(NetworkError::Truncated {
                what: "ipv4 options",
                needed: header_len,
                got: buf.len(),
            });
        }

        // Packet-in data may be cut short by the switch; keep what arrived.
        let total_len = usize::from(BigEndian::read_u16(&buf[2..4]));
        let end = total_len.clamp(header_len, buf.len());

        Ok(Ipv4Packet {
            protocol: buf[9],
            src: read_ipv4(&buf[12..16]),
            dst: read_ipv4(&buf[16..20]),
            ttl: buf[8],
            payload: buf[header_len..end].to_vec(),
        })
    }

    /// Writes a 20-byte header (no options) followed by the payload.
    /// Fails if the payload does not fit the 16-bit total length.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), NetworkError> {
        let total_len = u16::try_from(IPV4_MIN_HEADER_LEN + self.payload.len()).map_err(|_| {
            NetworkError::TooLarge {
                what: "ipv4 payload",
                max: IPV4_MAX_PAYLOAD_LEN,
                got: self.payload.len(),
            }
        })?;

        let mut header = [0u8; IPV4_MIN_HEADER_LEN];
        header[0] = 0x45;
        BigEndian::write_u16(&mut header[2..4], total_len);
        header[8] = self.ttl;
        header[9] = self.protocol;
        header[12..16].copy_from_slice(&self.src.octets());
        header[16..20].copy_from_slice(&self.dst.octets());
        let checksum = internet_checksum(&header);
        BigEndian::write_u16(&mut header[10..12], checksum);

        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        Ok(())
    }
}

fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(u16::from_be_bytes([*hi, 0])),
            _ => 0,
        })
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

// ============================================================================
// Ethernet
// ============================================================================

/// What an Ethernet frame carries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Arp(ArpPacket),
    Ipv4(Ipv4Packet),
    Other {
        ethertype: u16,
        #[serde(default)]
        data: Vec<u8>,
    },
}

/// Parsed Ethernet II frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EthernetFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub payload: Payload,
}

impl EthernetFrame {
    pub fn new(dst: MacAddr, src: MacAddr, payload: Payload) -> Self {
        Self { dst, src, payload }
    }

    pub fn ethertype(&self) -> u16 {
        match &self.payload {
            Payload::Arp(_) => ETH_TYPE_ARP,
            Payload::Ipv4(_) => ETH_TYPE_IPV4,
            Payload::Other { ethertype, .. } => *ethertype,
        }
    }

    pub fn arp(&self) -> Option<&ArpPacket> {
        match &self.payload {
            Payload::Arp(arp) => Some(arp),
            _ => None,
        }
    }

    pub fn ipv4(&self) -> Option<&Ipv4Packet> {
        match &self.payload {
            Payload::Ipv4(ip) => Some(ip),
            _ => None,
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, NetworkError> {
        if buf.len() < ETH_HEADER_LEN {
            return Err(NetworkError::Truncated {
                what: "ethernet header",
                needed: ETH_HEADER_LEN,
                got: buf.len(),
            });
        }

        let dst = read_mac(&buf[0..6]);
        let src = read_mac(&buf[6..12]);
        let ethertype = BigEndian::read_u16(&buf[12..14]);
        let body = &buf[ETH_HEADER_LEN..];

        let payload = match ethertype {
            ETH_TYPE_ARP => Payload::Arp(ArpPacket::parse(body)?),
            ETH_TYPE_IPV4 => Payload::Ipv4(Ipv4Packet::parse(body)?),
            other => Payload::Other {
                ethertype: other,
                data: body.to_vec(),
            },
        };

        Ok(Self { dst, src, payload })
    }

    /// Serialize without trailing pad; the switch pads short frames
    pub fn to_bytes(&self) -> Result<Vec<u8>, NetworkError> {
        let mut out = Vec::with_capacity(ETH_HEADER_LEN + ARP_PACKET_LEN);
        out.extend_from_slice(self.dst.as_bytes());
        out.extend_from_slice(self.src.as_bytes());
        out.extend_from_slice(&self.ethertype().to_be_bytes());

        match &self.payload {
            Payload::Arp(arp) => arp.write_to(&mut out),
            Payload::Ipv4(ip) => ip.write_to(&mut out)?,
            Payload::Other { data, .. } => out.extend_from_slice(data),
        }
        Ok(out)
    }
}

impl fmt::Display for EthernetFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} > {} ", self.src, self.dst)?;
        match &self.payload {
            Payload::Arp(arp) => match arp.op {
                ArpOp::Request => write!(
                    f,
                    "arp who-has {} tell {}",
                    arp.target_ip, arp.sender_ip
                ),
                ArpOp::Reply => write!(f, "arp {} is-at {}", arp.sender_ip, arp.sender_hw),
            },
            Payload::Ipv4(ip) => write!(
                f,
                "ipv4 {} > {} proto {} len {}",
                ip.src,
                ip.dst,
                ip.protocol,
                ip.payload.len()
            ),
            Payload::Other { ethertype, data } => {
                write!(f, "ethertype {:#06x} len {}", ethertype, data.len())
            }
        }
    }
}

fn read_mac(bytes: &[u8]) -> MacAddr {
    let mut octets = [0u8; 6];
    octets.copy_from_slice(&bytes[..6]);
    MacAddr(octets)
}

fn read_ipv4(bytes: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arp_request_bytes() -> Vec<u8> {
        let mut buf = vec![0xff; 6];
        buf.extend_from_slice(&[0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01]);
        buf.extend_from_slice(&[0x08, 0x06]);
        buf.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
        buf.extend_from_slice(&[0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01]);
        buf.extend_from_slice(&[10, 0, 1, 10]);
        buf.extend_from_slice(&[0; 6]);
        buf.extend_from_slice(&[10, 0, 4, 10]);
        // minimum-size padding as delivered by most switches
        buf.resize(60, 0);
        buf
    }

    #[test]
    fn test_parse_padded_arp_request() {
        let frame = EthernetFrame::parse(&arp_request_bytes()).unwrap();
        assert_eq!(frame.ethertype(), ETH_TYPE_ARP);
        assert!(frame.dst.is_broadcast());

        let arp = frame.arp().unwrap();
        assert_eq!(arp.op, ArpOp::Request);
        assert_eq!(arp.sender_ip, Ipv4Addr::new(10, 0, 1, 10));
        assert_eq!(arp.target_ip, Ipv4Addr::new(10, 0, 4, 10));
        assert_eq!(arp.sender_hw, MacAddr::new(0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01));
    }

    #[test]
    fn test_serialized_arp_matches_wire_bytes() {
        let bytes = arp_request_bytes();
        let frame = EthernetFrame::parse(&bytes).unwrap();
        assert_eq!(
            frame.to_bytes().unwrap(),
            bytes[..ETH_HEADER_LEN + ARP_PACKET_LEN].to_vec()
        );
    }

    #[test]
    fn test_truncated_frames() {
        assert!(matches!(
            EthernetFrame::parse(&[0u8; 5]),
            Err(NetworkError::Truncated { needed: 14, .. })
        ));

        let bytes = arp_request_bytes();
        assert!(matches!(
            EthernetFrame::parse(&bytes[..20]),
            Err(NetworkError::Truncated { what: "arp packet", .. })
        ));
    }

    #[test]
    fn test_bad_arp_opcode_is_malformed() {
        let mut bytes = arp_request_bytes();
        bytes[ETH_HEADER_LEN + 7] = 9;
        assert!(matches!(
            EthernetFrame::parse(&bytes),
            Err(NetworkError::Malformed(_))
        ));
    }

    #[test]
    fn test_ipv4_header_fields_and_checksum() {
        let frame = EthernetFrame::new(
            MacAddr::new(0, 0, 0, 0, 0, 2),
            MacAddr::new(0, 0, 0, 0, 0, 1),
            Payload::Ipv4(Ipv4Packet {
                protocol: IP_PROTO_ICMP,
                src: Ipv4Addr::new(172, 16, 10, 100),
                dst: Ipv4Addr::new(10, 0, 4, 10),
                ttl: 64,
                payload: vec![8, 0, 0, 0],
            }),
        );
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(bytes.len(), ETH_HEADER_LEN + IPV4_MIN_HEADER_LEN + 4);

        // a correct header checksums to zero
        let header = &bytes[ETH_HEADER_LEN..ETH_HEADER_LEN + IPV4_MIN_HEADER_LEN];
        assert_eq!(internet_checksum(header), 0);

        let parsed = EthernetFrame::parse(&bytes).unwrap();
        let ip = parsed.ipv4().unwrap();
        assert_eq!(ip.protocol, IP_PROTO_ICMP);
        assert_eq!(ip.src, Ipv4Addr::new(172, 16, 10, 100));
        assert_eq!(ip.payload, vec![8, 0, 0, 0]);
    }

    #[test]
    fn test_oversized_ipv4_payload_not_encoded() {
        let mut packet = Ipv4Packet {
            protocol: IP_PROTO_TCP,
            src: Ipv4Addr::new(10, 0, 1, 10),
            dst: Ipv4Addr::new(10, 0, 4, 10),
            ttl: 64,
            payload: vec![0; IPV4_MAX_PAYLOAD_LEN],
        };
        let mut out = Vec::new();
        packet.write_to(&mut out).unwrap();
        assert_eq!(&out[2..4], &u16::MAX.to_be_bytes());

        packet.payload.push(0);
        let mut out = Vec::new();
        let err = packet.write_to(&mut out).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::TooLarge {
                max: IPV4_MAX_PAYLOAD_LEN,
                got,
                ..
            } if got == IPV4_MAX_PAYLOAD_LEN + 1
        ));
        assert!(err.is_codec());
        assert!(out.is_empty());

        let frame = EthernetFrame::new(MacAddr::BROADCAST, MacAddr::ZERO, Payload::Ipv4(packet));
        assert!(frame.to_bytes().is_err());
    }

    #[test]
    fn test_unknown_ethertype_is_opaque() {
        let mut bytes = vec![0u8; 12];
        bytes.extend_from_slice(&[0x86, 0xdd]);
        bytes.extend_from_slice(&[1, 2, 3]);
        let frame = EthernetFrame::parse(&bytes).unwrap();
        assert_eq!(frame.ethertype(), 0x86dd);
        assert!(frame.arp().is_none());
        assert!(frame.ipv4().is_none());
    }

    #[test]
    fn test_display_summary() {
        let frame = EthernetFrame::parse(&arp_request_bytes()).unwrap();
        assert_eq!(
            frame.to_string(),
            "aa:aa:aa:aa:aa:01 > ff:ff:ff:ff:ff:ff arp who-has 10.0.4.10 tell 10.0.1.10"
        );
    }
}
