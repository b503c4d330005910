//! checksum - Internet checksum (RFC 1071) helpers

use std::net::{Ipv4Addr, Ipv6Addr};

const IPV4_CHECKSUM_OFFSET: usize = 10;
const UDP_CHECKSUM_OFFSET: usize = 6;
const ICMP_CHECKSUM_OFFSET: usize = 2;

/// Fold the carries of a running one's complement sum into 16 bits and complement it.
///
/// Four rounds are enough for any sum accumulated over a frame.
pub fn fold(sum: u64) -> u16 {
    let mut sum = sum;
    for _ in 0..4 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Add the big-endian 16-bit words of `data` to `sum`.  An odd trailing byte is padded with zero.
pub fn accumulate(sum: u64, data: &[u8]) -> u64 {
    let mut chunks = data.chunks_exact(2);
    let mut sum = sum;
    for word in &mut chunks {
        sum += u16::from_be_bytes([word[0], word[1]]) as u64;
    }
    if let [last] = chunks.remainder() {
        sum += u16::from_be_bytes([*last, 0]) as u64;
    }
    sum
}

/// Like `accumulate`, but treats the 16-bit field at `skip` as zero.
fn accumulate_skipping(sum: u64, data: &[u8], skip: usize) -> u64 {
    match (data.get(..skip), data.get(skip + 2..)) {
        (Some(before), Some(after)) => accumulate(accumulate(sum, before), after),
        _ => accumulate(sum, data),
    }
}

/// Checksum of an IPv4 header, computed as though its checksum field were zero.
pub fn ipv4_checksum(header: &[u8]) -> u16 {
    fold(accumulate_skipping(0, header, IPV4_CHECKSUM_OFFSET))
}

/// True if `data` (with its checksum field in place) sums to zero.
pub fn verify(data: &[u8]) -> bool {
    fold(accumulate(0, data)) == 0
}

pub fn ipv4_pseudo_header_sum(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, len: u16) -> u64 {
    let sum = accumulate(0, &src.octets());
    let sum = accumulate(sum, &dst.octets());
    sum + protocol as u64 + len as u64
}

pub fn ipv6_pseudo_header_sum(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, len: u32) -> u64 {
    let sum = accumulate(0, &src.octets());
    let sum = accumulate(sum, &dst.octets());
    sum + (len >> 16) as u64 + (len & 0xffff) as u64 + next_header as u64
}

/// UDP checksum over an IPv4 pseudo-header.  `datagram` is the UDP header plus payload.
///
/// A computed value of zero is transmitted as 0xffff, since zero means "no checksum".
pub fn udp_checksum_ipv4(src: Ipv4Addr, dst: Ipv4Addr, datagram: &[u8]) -> u16 {
    let sum = ipv4_pseudo_header_sum(src, dst, crate::IPPROTO_UDP, datagram.len() as u16);
    nonzero(fold(accumulate_skipping(sum, datagram, UDP_CHECKSUM_OFFSET)))
}

/// UDP checksum over an IPv6 pseudo-header.  Mandatory for UDP over IPv6 (RFC 8200, 8.1).
pub fn udp_checksum_ipv6(src: Ipv6Addr, dst: Ipv6Addr, datagram: &[u8]) -> u16 {
    let sum = ipv6_pseudo_header_sum(src, dst, crate::IPPROTO_UDP, datagram.len() as u32);
    nonzero(fold(accumulate_skipping(sum, datagram, UDP_CHECKSUM_OFFSET)))
}

/// ICMPv4 checksum over the whole ICMP message.
pub fn icmp_checksum(message: &[u8]) -> u16 {
    fold(accumulate_skipping(0, message, ICMP_CHECKSUM_OFFSET))
}

fn nonzero(checksum: u16) -> u16 {
    if checksum == 0 { 0xffff } else { checksum }
}
