//! sdf - Service Data Flow filters and their matching against a packet's 5-tuple
//!
//! Filters are written as IPFilterRule flow descriptions (TS29.212, 5.4.2 / RFC 6733, 4.3), e.g.
//! `permit out tcp from 10.0.0.0/8 1024-65535 to any 80`.

use gtpu::{FiveTuple, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdfError {
    #[error("Bad flow description '{0}': {1}")]
    BadFlowDescription(String, &'static str),
}

/// The L4 protocol classes an SDF filter distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SdfProtocol {
    /// Anything other than ICMP, TCP or UDP.
    Other = 0,
    Icmp = 1,
    Tcp = 2,
    Udp = 3,
    /// `ip`: any protocol.
    Any = 0xff,
}

impl SdfProtocol {
    pub fn of(ip_protocol: u8) -> Self {
        match ip_protocol {
            IPPROTO_ICMP => SdfProtocol::Icmp,
            IPPROTO_TCP => SdfProtocol::Tcp,
            IPPROTO_UDP => SdfProtocol::Udp,
            _ => SdfProtocol::Other,
        }
    }

    fn matches(&self, ip_protocol: u8) -> bool {
        *self == SdfProtocol::Any || *self == SdfProtocol::of(ip_protocol)
    }
}

impl FromStr for SdfProtocol {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(SdfProtocol::Any),
            "icmp" => Ok(SdfProtocol::Icmp),
            "tcp" => Ok(SdfProtocol::Tcp),
            "udp" => Ok(SdfProtocol::Udp),
            // ICMPv6 packets are never classified.
            "icmp6" | "58" => Err("ICMPv6 filters are not supported"),
            number => number
                .parse::<u8>()
                .map(SdfProtocol::of)
                .map_err(|_| "unknown protocol"),
        }
    }
}

/// An address with a mask.  The address is stored already masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpMask {
    Any,
    V4 { addr: Ipv4Addr, mask: Ipv4Addr },
    V6 { addr: Ipv6Addr, mask: Ipv6Addr },
}

impl IpMask {
    /// A masked address.  An address of the other IP family never matches.
    pub fn matches(&self, ip: IpAddr) -> bool {
        match (self, ip) {
            (IpMask::Any, _) => true,
            (IpMask::V4 { addr, mask }, IpAddr::V4(ip)) => {
                u32::from(ip) & u32::from(*mask) == u32::from(*addr)
            }
            (IpMask::V6 { addr, mask }, IpAddr::V6(ip)) => {
                u128::from(ip) & u128::from(*mask) == u128::from(*addr)
            }
            _ => false,
        }
    }

    /// Number of leading one bits in the mask.
    pub fn prefix_len(&self) -> u32 {
        match self {
            IpMask::Any => 0,
            IpMask::V4 { mask, .. } => u32::from(*mask).leading_ones(),
            IpMask::V6 { mask, .. } => u128::from(*mask).leading_ones(),
        }
    }

    /// Parse `any`, `assigned`, an address, or an address with a prefix length.
    pub fn parse(token: &str) -> Result<Self, &'static str> {
        if token == "any" || token == "assigned" {
            return Ok(IpMask::Any);
        }
        let (ip, prefix_len) = match token.split_once('/') {
            Some((ip, len)) => (ip, Some(len.parse::<u32>().map_err(|_| "bad prefix length")?)),
            None => (token, None),
        };
        match ip.parse::<IpAddr>().map_err(|_| "bad address")? {
            IpAddr::V4(ip) => {
                let len = prefix_len.unwrap_or(32);
                if len > 32 {
                    return Err("bad prefix length");
                }
                let mask = u32::MAX.checked_shl(32 - len).unwrap_or(0);
                Ok(IpMask::V4 {
                    addr: Ipv4Addr::from(u32::from(ip) & mask),
                    mask: Ipv4Addr::from(mask),
                })
            }
            IpAddr::V6(ip) => {
                let len = prefix_len.unwrap_or(128);
                if len > 128 {
                    return Err("bad prefix length");
                }
                let mask = u128::MAX.checked_shl(128 - len).unwrap_or(0);
                Ok(IpMask::V6 {
                    addr: Ipv6Addr::from(u128::from(ip) & mask),
                    mask: Ipv6Addr::from(mask),
                })
            }
        }
    }
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub lower: u16,
    pub upper: u16,
}

impl PortRange {
    pub const ALL: PortRange = PortRange {
        lower: 0,
        upper: u16::MAX,
    };

    pub fn contains(&self, port: u16) -> bool {
        self.lower <= port && port <= self.upper
    }

    fn parse(token: &str) -> Result<Self, &'static str> {
        let port = |s: &str| s.parse::<u16>().map_err(|_| "bad port");
        let range = match token.split_once('-') {
            Some((lower, upper)) => PortRange {
                lower: port(lower)?,
                upper: port(upper)?,
            },
            None => {
                let p = port(token)?;
                PortRange { lower: p, upper: p }
            }
        };
        if range.lower > range.upper {
            return Err("port range lower bound exceeds upper bound");
        }
        Ok(range)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct SdfFilter {
    pub protocol: SdfProtocol,
    pub src: IpMask,
    pub src_ports: PortRange,
    pub dst: IpMask,
    pub dst_ports: PortRange,
}

impl SdfFilter {
    /// True if every field of the filter matches.  Ports are zero for packets that are neither
    /// TCP nor UDP.
    pub fn matches(&self, packet: &FiveTuple) -> bool {
        self.protocol.matches(packet.protocol)
            && self.src.matches(packet.src)
            && self.dst.matches(packet.dst)
            && self.src_ports.contains(packet.src_port)
            && self.dst_ports.contains(packet.dst_port)
    }
}

impl FromStr for SdfFilter {
    type Err = SdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason: &'static str| SdfError::BadFlowDescription(s.to_string(), reason);
        let mut tokens = s.split_whitespace().peekable();
        let mut expect = |keyword: &'static str, reason| match tokens.next() {
            Some(t) if t == keyword => Ok(()),
            _ => Err(bad(reason)),
        };
        expect("permit", "expected 'permit'")?;
        expect("out", "expected 'out'")?;

        let protocol = tokens
            .next()
            .ok_or(bad("missing protocol"))?
            .parse::<SdfProtocol>()
            .map_err(bad)?;

        if tokens.next() != Some("from") {
            return Err(bad("expected 'from'"));
        }
        let src = IpMask::parse(tokens.next().ok_or(bad("missing source"))?).map_err(bad)?;
        let src_ports = match tokens.peek() {
            Some(&"to") | None => PortRange::ALL,
            Some(ports) => {
                let ports = PortRange::parse(ports).map_err(bad)?;
                tokens.next();
                ports
            }
        };

        if tokens.next() != Some("to") {
            return Err(bad("expected 'to'"));
        }
        let dst = IpMask::parse(tokens.next().ok_or(bad("missing destination"))?).map_err(bad)?;
        let dst_ports = match tokens.next() {
            Some(ports) => PortRange::parse(ports).map_err(bad)?,
            None => PortRange::ALL,
        };
        if tokens.next().is_some() {
            return Err(bad("unexpected trailing text"));
        }

        Ok(SdfFilter {
            protocol,
            src,
            src_ports,
            dst,
            dst_ports,
        })
    }
}

impl TryFrom<String> for SdfFilter {
    type Error = SdfError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
