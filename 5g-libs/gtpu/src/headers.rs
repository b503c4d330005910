//! headers - typed views over the fixed part of each header
//!
//! A view wraps a byte slice that the cursor has already checked is long enough for the
//! header, so the accessors index directly.  Mutable views are the same types over `&mut [u8]`.

use std::net::{Ipv4Addr, Ipv6Addr};

pub const ETH_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
pub const UDP_HEADER_LEN: usize = 8;
pub const TCP_HEADER_LEN: usize = 20;
pub const ICMP_HEADER_LEN: usize = 8;
pub const GTPU_HEADER_LEN: usize = 8;

/// Sequence number, N-PDU number and next extension header type, present when any of E, S or
/// PN is set.
pub const GTPU_OPTIONAL_LEN: usize = 4;

/// The optional fields plus one 4-byte extension header, as carried by G-PDUs from the RAN.
pub const GTPU_EXTENSION_LEN: usize = 8;

pub type MacAddr = [u8; 6];

macro_rules! header_view {
    ($name:ident, $len:expr) => {
        #[derive(Debug)]
        pub struct $name<T>(T);

        impl<T: AsRef<[u8]>> $name<T> {
            /// Wrap `buf`, which must hold at least the fixed header length.
            pub fn new(buf: T) -> Option<Self> {
                if buf.as_ref().len() >= $len {
                    Some($name(buf))
                } else {
                    None
                }
            }

            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_ref()
            }

            #[allow(dead_code)]
            fn byte(&self, idx: usize) -> u8 {
                self.0.as_ref()[idx]
            }

            #[allow(dead_code)]
            fn be16(&self, idx: usize) -> u16 {
                let b = self.0.as_ref();
                u16::from_be_bytes([b[idx], b[idx + 1]])
            }

            #[allow(dead_code)]
            fn be32(&self, idx: usize) -> u32 {
                let b = self.0.as_ref();
                u32::from_be_bytes([b[idx], b[idx + 1], b[idx + 2], b[idx + 3]])
            }
        }

        impl<T: AsMut<[u8]>> $name<T> {
            #[allow(dead_code)]
            fn bytes_mut(&mut self) -> &mut [u8] {
                self.0.as_mut()
            }

            #[allow(dead_code)]
            fn set_be16(&mut self, idx: usize, value: u16) {
                self.bytes_mut()[idx..idx + 2].copy_from_slice(&value.to_be_bytes());
            }

            #[allow(dead_code)]
            fn set_be32(&mut self, idx: usize, value: u32) {
                self.bytes_mut()[idx..idx + 4].copy_from_slice(&value.to_be_bytes());
            }
        }
    };
}

header_view!(EthernetHeader, ETH_HEADER_LEN);
header_view!(Ipv4Header, IPV4_HEADER_LEN);
header_view!(Ipv6Header, IPV6_HEADER_LEN);
header_view!(UdpHeader, UDP_HEADER_LEN);
header_view!(TcpHeader, TCP_HEADER_LEN);
header_view!(IcmpHeader, ICMP_HEADER_LEN);
header_view!(GtpuHeader, GTPU_HEADER_LEN);

// ---- Ethernet II ----

impl<T: AsRef<[u8]>> EthernetHeader<T> {
    pub fn destination(&self) -> MacAddr {
        mac_at(self.as_bytes(), 0)
    }
    pub fn source(&self) -> MacAddr {
        mac_at(self.as_bytes(), 6)
    }
    pub fn ether_type(&self) -> u16 {
        self.be16(12)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> EthernetHeader<T> {
    pub fn set_destination(&mut self, mac: MacAddr) {
        self.bytes_mut()[0..6].copy_from_slice(&mac);
    }
    pub fn set_source(&mut self, mac: MacAddr) {
        self.bytes_mut()[6..12].copy_from_slice(&mac);
    }
    pub fn set_ether_type(&mut self, ether_type: u16) {
        self.set_be16(12, ether_type)
    }
    pub fn swap_addresses(&mut self) {
        let (dst, src) = (self.destination(), self.source());
        self.set_destination(src);
        self.set_source(dst);
    }
}

fn mac_at(b: &[u8], idx: usize) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&b[idx..idx + 6]);
    mac
}

// ---- IPv4, RFC 791 ----

impl<T: AsRef<[u8]>> Ipv4Header<T> {
    pub fn version(&self) -> u8 {
        self.byte(0) >> 4
    }
    /// Header length in bytes, from the IHL field.
    pub fn header_len(&self) -> usize {
        ((self.byte(0) & 0x0f) as usize) * 4
    }
    pub fn tos(&self) -> u8 {
        self.byte(1)
    }
    pub fn total_length(&self) -> u16 {
        self.be16(2)
    }
    pub fn ttl(&self) -> u8 {
        self.byte(8)
    }
    pub fn protocol(&self) -> u8 {
        self.byte(9)
    }
    pub fn checksum(&self) -> u16 {
        self.be16(10)
    }
    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.byte(12), self.byte(13), self.byte(14), self.byte(15))
    }
    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.byte(16), self.byte(17), self.byte(18), self.byte(19))
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Ipv4Header<T> {
    pub fn set_tos(&mut self, tos: u8) {
        self.bytes_mut()[1] = tos;
    }
    pub fn set_source(&mut self, ip: Ipv4Addr) {
        self.bytes_mut()[12..16].copy_from_slice(&ip.octets());
    }
    pub fn set_destination(&mut self, ip: Ipv4Addr) {
        self.bytes_mut()[16..20].copy_from_slice(&ip.octets());
    }
    pub fn swap_addresses(&mut self) {
        let (src, dst) = (self.source(), self.destination());
        self.set_source(dst);
        self.set_destination(src);
    }

    /// Write a fresh 20-byte header without options.
    pub fn fill(&mut self, tos: u8, total_length: u16, protocol: u8, src: Ipv4Addr, dst: Ipv4Addr) {
        let b = self.bytes_mut();
        b[0] = 0x45; // version 4, IHL 5
        b[1] = tos;
        b[2..4].copy_from_slice(&total_length.to_be_bytes());
        b[4..6].copy_from_slice(&[0, 0]); // identification
        b[6..8].copy_from_slice(&[0x40, 0x00]); // don't fragment, offset 0
        b[8] = 64; // TTL
        b[9] = protocol;
        b[10..12].copy_from_slice(&[0, 0]);
        b[12..16].copy_from_slice(&src.octets());
        b[16..20].copy_from_slice(&dst.octets());
    }

    /// Recompute the header checksum over the full IHL-sized header.
    pub fn update_checksum(&mut self) {
        let len = self.header_len().clamp(IPV4_HEADER_LEN, self.as_bytes().len());
        let checksum = crate::checksum::ipv4_checksum(&self.as_bytes()[..len]);
        self.set_be16(10, checksum);
    }
}

// ---- IPv6, RFC 8200 ----

impl<T: AsRef<[u8]>> Ipv6Header<T> {
    pub fn version(&self) -> u8 {
        self.byte(0) >> 4
    }
    pub fn traffic_class(&self) -> u8 {
        (self.byte(0) << 4) | (self.byte(1) >> 4)
    }
    pub fn payload_length(&self) -> u16 {
        self.be16(4)
    }
    pub fn next_header(&self) -> u8 {
        self.byte(6)
    }
    pub fn hop_limit(&self) -> u8 {
        self.byte(7)
    }
    pub fn source(&self) -> Ipv6Addr {
        ipv6_at(self.as_bytes(), 8)
    }
    pub fn destination(&self) -> Ipv6Addr {
        ipv6_at(self.as_bytes(), 24)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Ipv6Header<T> {
    pub fn set_source(&mut self, ip: Ipv6Addr) {
        self.bytes_mut()[8..24].copy_from_slice(&ip.octets());
    }
    pub fn set_destination(&mut self, ip: Ipv6Addr) {
        self.bytes_mut()[24..40].copy_from_slice(&ip.octets());
    }
    pub fn swap_addresses(&mut self) {
        let (src, dst) = (self.source(), self.destination());
        self.set_source(dst);
        self.set_destination(src);
    }
}

fn ipv6_at(b: &[u8], idx: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&b[idx..idx + 16]);
    Ipv6Addr::from(octets)
}

// ---- UDP, RFC 768 ----

impl<T: AsRef<[u8]>> UdpHeader<T> {
    pub fn source_port(&self) -> u16 {
        self.be16(0)
    }
    pub fn destination_port(&self) -> u16 {
        self.be16(2)
    }
    pub fn length(&self) -> u16 {
        self.be16(4)
    }
    pub fn checksum(&self) -> u16 {
        self.be16(6)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> UdpHeader<T> {
    pub fn fill(&mut self, source_port: u16, destination_port: u16, length: u16) {
        self.set_be16(0, source_port);
        self.set_be16(2, destination_port);
        self.set_be16(4, length);
        self.set_be16(6, 0);
    }
    pub fn swap_ports(&mut self) {
        let (src, dst) = (self.source_port(), self.destination_port());
        self.set_be16(0, dst);
        self.set_be16(2, src);
    }
    pub fn set_checksum(&mut self, checksum: u16) {
        self.set_be16(6, checksum)
    }
}

// ---- TCP, RFC 9293 (ports only) ----

impl<T: AsRef<[u8]>> TcpHeader<T> {
    pub fn source_port(&self) -> u16 {
        self.be16(0)
    }
    pub fn destination_port(&self) -> u16 {
        self.be16(2)
    }
}

// ---- ICMPv4 echo, RFC 792 ----

impl<T: AsRef<[u8]>> IcmpHeader<T> {
    pub fn icmp_type(&self) -> u8 {
        self.byte(0)
    }
    pub fn code(&self) -> u8 {
        self.byte(1)
    }
    pub fn checksum(&self) -> u16 {
        self.be16(2)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> IcmpHeader<T> {
    pub fn set_icmp_type(&mut self, icmp_type: u8) {
        self.bytes_mut()[0] = icmp_type;
    }
    pub fn set_checksum(&mut self, checksum: u16) {
        self.set_be16(2, checksum)
    }
}

// ---- GTP-U, TS29.281, 5.1 ----
//
//  | Ver | PT | * | E | S | PN |  Message type  |     Length     |
//  |                           TEID                             |

const GTPU_FLAG_E: u8 = 0b0000_0100;
const GTPU_FLAG_S: u8 = 0b0000_0010;
const GTPU_FLAG_PN: u8 = 0b0000_0001;

impl<T: AsRef<[u8]>> GtpuHeader<T> {
    pub fn flags(&self) -> u8 {
        self.byte(0)
    }
    pub fn version(&self) -> u8 {
        self.byte(0) >> 5
    }
    pub fn protocol_type(&self) -> bool {
        self.byte(0) & 0b0001_0000 != 0
    }
    /// True if any of E, S or PN is set, meaning the optional fields follow the base header.
    pub fn has_optional_fields(&self) -> bool {
        self.byte(0) & (GTPU_FLAG_E | GTPU_FLAG_S | GTPU_FLAG_PN) != 0
    }
    /// Length of the header as stripped on decapsulation.
    pub fn header_len(&self) -> usize {
        if self.has_optional_fields() {
            GTPU_HEADER_LEN + GTPU_EXTENSION_LEN
        } else {
            GTPU_HEADER_LEN
        }
    }
    pub fn message_type(&self) -> u8 {
        self.byte(1)
    }
    pub fn message_length(&self) -> u16 {
        self.be16(2)
    }
    pub fn teid(&self) -> u32 {
        self.be32(4)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> GtpuHeader<T> {
    pub fn fill(&mut self, message_type: u8, message_length: u16, teid: u32) {
        let b = self.bytes_mut();
        b[0] = crate::GTP_FLAGS;
        b[1] = message_type;
        self.set_be16(2, message_length);
        self.set_be32(4, teid);
    }
    pub fn set_message_type(&mut self, message_type: u8) {
        self.bytes_mut()[1] = message_type;
    }
    pub fn set_teid(&mut self, teid: u32) {
        self.set_be32(4, teid)
    }
}
