//! codec - GTP-U encapsulation, decapsulation and in-place replies
//!
//! All operations act on a `PacketView` whose cursor has parsed at least the Ethernet header at
//! the start of the frame.  Operations that resize the frame leave the cursor describing the
//! rewritten frame.

use crate::buffer::BufferError;
use crate::checksum;
use crate::cursor::{Layers, PacketView, ParseError};
use crate::headers::*;
use crate::{
    ETH_P_IP, ETH_P_IPV6, GTP_UDP_PORT, GTPU_ECHO_RESPONSE, GTPU_G_PDU, ICMP_ECHO_REPLY,
    ICMP_ECHO_REQUEST, IPPROTO_ICMP, IPPROTO_UDP,
};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Bytes prepended by `add_gtp_header()`.
pub const GTPU_ENCAP_LEN: usize = IPV4_HEADER_LEN + UDP_HEADER_LEN + GTPU_HEADER_LEN;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("No {0} header in parse state")]
    MissingHeader(&'static str),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Inner packet is not IP")]
    NotIp,
    #[error("Not an ICMP echo request")]
    NotEchoRequest,
    #[error("Inner packet of {0} bytes is too long to encapsulate")]
    TooLong(usize),
}

fn require_eth_at_start(view: &PacketView) -> Result<(), CodecError> {
    if view.layers().eth == Some(0) {
        Ok(())
    } else {
        Err(CodecError::MissingHeader("Ethernet"))
    }
}

/// Encapsulate the IP packet following the Ethernet header in IPv4/UDP/GTP-U (G-PDU).
///
/// The Ethernet header is moved to the new front of the frame with its EtherType set to IPv4.
/// The outer UDP checksum is left zero.  On success the cursor has parsed the outer headers and
/// points at the inner packet.  On failure the frame is unchanged.
pub fn add_gtp_header(
    view: &mut PacketView,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    tos: u8,
    teid: u32,
) -> Result<(), CodecError> {
    require_eth_at_start(view)?;
    let inner_len = if let Some(ip) = view.ip4() {
        ip.total_length() as usize
    } else if let Some(ip) = view.ip6() {
        IPV6_HEADER_LEN + ip.payload_length() as usize
    } else {
        return Err(CodecError::MissingHeader("IP"));
    };
    let total_length =
        u16::try_from(inner_len + GTPU_ENCAP_LEN).map_err(|_| CodecError::TooLong(inner_len))?;

    let (frame, cursor) = view.parts();
    frame.grow_front(GTPU_ENCAP_LEN)?;
    frame
        .data_mut()
        .copy_within(GTPU_ENCAP_LEN..GTPU_ENCAP_LEN + ETH_HEADER_LEN, 0);
    cursor.reset(
        ETH_HEADER_LEN + GTPU_ENCAP_LEN,
        Layers {
            eth: Some(0),
            ip4: Some(ETH_HEADER_LEN),
            udp: Some(ETH_HEADER_LEN + IPV4_HEADER_LEN),
            gtp: Some(ETH_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN),
            ..Default::default()
        },
    );

    view.eth_mut()
        .ok_or(CodecError::MissingHeader("Ethernet"))?
        .set_ether_type(ETH_P_IP);

    let mut ip = view.ip4_mut().ok_or(CodecError::MissingHeader("IPv4"))?;
    ip.fill(tos, total_length, IPPROTO_UDP, src, dst);
    ip.update_checksum();

    // TS29.281, 4.4.2.3: both ports are 2152 for G-PDUs.
    view.udp_mut().ok_or(CodecError::MissingHeader("UDP"))?.fill(
        GTP_UDP_PORT,
        GTP_UDP_PORT,
        total_length - IPV4_HEADER_LEN as u16,
    );

    view.gtp_mut()
        .ok_or(CodecError::MissingHeader("GTP-U"))?
        .fill(GTPU_G_PDU, inner_len as u16, teid);
    Ok(())
}

/// Strip the outer IP/UDP/GTP-U headers, moving the Ethernet header forward, and re-parse the
/// inner Ethernet and IP headers.  Returns the inner IP protocol / next header.
pub fn remove_gtp_header(view: &mut PacketView) -> Result<u8, CodecError> {
    require_eth_at_start(view)?;
    let gtp_offset = view.layers().gtp.ok_or(CodecError::MissingHeader("GTP-U"))?;
    let gtp_len = view
        .gtp()
        .ok_or(CodecError::MissingHeader("GTP-U"))?
        .header_len();
    let inner_offset = gtp_offset + gtp_len;
    if view.len() < inner_offset {
        return Err(ParseError::Truncated {
            header: "GTP-U",
            needed: gtp_len,
            available: view.len() - gtp_offset,
        }
        .into());
    }
    let strip = inner_offset - ETH_HEADER_LEN;

    let (frame, cursor) = view.parts();
    frame.data_mut().copy_within(0..ETH_HEADER_LEN, strip);
    frame.shrink_front(strip)?;
    cursor.reset(0, Layers::default());

    view.parse_ethernet()?;
    match view.remaining().first().map(|b| b >> 4) {
        Some(4) => {
            set_ether_type(view, ETH_P_IP)?;
            Ok(view.parse_ipv4()?)
        }
        Some(6) => {
            set_ether_type(view, ETH_P_IPV6)?;
            Ok(view.parse_ipv6()?)
        }
        _ => Err(CodecError::NotIp),
    }
}

fn set_ether_type(view: &mut PacketView, ether_type: u16) -> Result<(), CodecError> {
    view.eth_mut()
        .ok_or(CodecError::MissingHeader("Ethernet"))?
        .set_ether_type(ether_type);
    Ok(())
}

/// Turn a GTP-U Echo Request into an Echo Response, to be sent back out of the interface it
/// arrived on.  TS29.281, 7.2.
pub fn handle_echo_request(view: &mut PacketView) -> Result<(), CodecError> {
    let layers = *view.layers();
    if layers.udp.is_none() {
        return Err(CodecError::MissingHeader("UDP"));
    }
    if layers.gtp.is_none() {
        return Err(CodecError::MissingHeader("GTP-U"));
    }

    view.eth_mut()
        .ok_or(CodecError::MissingHeader("Ethernet"))?
        .swap_addresses();

    if let Some(mut ip) = view.ip4_mut() {
        ip.swap_addresses();
        ip.update_checksum();
    } else if let Some(mut ip) = view.ip6_mut() {
        ip.swap_addresses();
    } else {
        return Err(CodecError::MissingHeader("IP"));
    }

    view.udp_mut()
        .ok_or(CodecError::MissingHeader("UDP"))?
        .swap_ports();
    view.gtp_mut()
        .ok_or(CodecError::MissingHeader("GTP-U"))?
        .set_message_type(GTPU_ECHO_RESPONSE);

    // Zero over IPv4, recomputed over IPv6.
    fill_udp_checksum(view, false)
}

/// Point an already encapsulated G-PDU at a different tunnel endpoint (N9 relay).
pub fn update_gtp_tunnel(
    view: &mut PacketView,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    tos: u8,
    teid: u32,
) -> Result<(), CodecError> {
    let mut ip = view.ip4_mut().ok_or(CodecError::MissingHeader("IPv4"))?;
    ip.set_source(src);
    ip.set_destination(dst);
    ip.set_tos(tos);
    ip.update_checksum();

    view.udp_mut()
        .ok_or(CodecError::MissingHeader("UDP"))?
        .set_checksum(0);
    view.gtp_mut()
        .ok_or(CodecError::MissingHeader("GTP-U"))?
        .set_teid(teid);
    Ok(())
}

/// Turn an ICMP echo request into a reply from `local_ip` back to its sender.
pub fn prepare_icmp_echo_reply(view: &mut PacketView, local_ip: Ipv4Addr) -> Result<(), CodecError> {
    let ip_offset = view.layers().ip4.ok_or(CodecError::MissingHeader("IPv4"))?;
    let (header_len, total_length, protocol, peer) = {
        let ip = view.ip4().ok_or(CodecError::MissingHeader("IPv4"))?;
        (ip.header_len(), ip.total_length() as usize, ip.protocol(), ip.source())
    };
    if protocol != IPPROTO_ICMP {
        return Err(CodecError::NotEchoRequest);
    }

    let icmp_offset = ip_offset + header_len;
    let end = (ip_offset + total_length).min(view.len());
    let available = end.saturating_sub(icmp_offset);
    let truncated = ParseError::Truncated {
        header: "ICMP",
        needed: ICMP_HEADER_LEN,
        available,
    };
    let message = view.data_mut().get_mut(icmp_offset..end).ok_or(truncated)?;
    let mut icmp = IcmpHeader::new(message).ok_or(truncated)?;
    if icmp.icmp_type() != ICMP_ECHO_REQUEST {
        return Err(CodecError::NotEchoRequest);
    }
    icmp.set_icmp_type(ICMP_ECHO_REPLY);
    let icmp_checksum = checksum::icmp_checksum(icmp.as_bytes());
    icmp.set_checksum(icmp_checksum);

    let mut ip = view.ip4_mut().ok_or(CodecError::MissingHeader("IPv4"))?;
    ip.set_source(local_ip);
    ip.set_destination(peer);
    ip.update_checksum();
    Ok(())
}

/// Write the UDP checksum of the parsed UDP header.  Over IPv4 the checksum is computed only if
/// `ipv4_enabled` and is otherwise zeroed.  Over IPv6 it is always computed (RFC 8200, 8.1).
pub fn fill_udp_checksum(view: &mut PacketView, ipv4_enabled: bool) -> Result<(), CodecError> {
    let udp_offset = view.layers().udp.ok_or(CodecError::MissingHeader("UDP"))?;
    let udp_len = view
        .udp()
        .ok_or(CodecError::MissingHeader("UDP"))?
        .length() as usize;
    let end = (udp_offset + udp_len.max(UDP_HEADER_LEN)).min(view.len());
    let datagram = &view.data()[udp_offset..end];

    let udp_checksum = if let Some(ip) = view.ip4() {
        if ipv4_enabled {
            checksum::udp_checksum_ipv4(ip.source(), ip.destination(), datagram)
        } else {
            0
        }
    } else if let Some(ip) = view.ip6() {
        checksum::udp_checksum_ipv6(ip.source(), ip.destination(), datagram)
    } else {
        return Err(CodecError::MissingHeader("IP"));
    };

    view.udp_mut()
        .ok_or(CodecError::MissingHeader("UDP"))?
        .set_checksum(udp_checksum);
    Ok(())
}
