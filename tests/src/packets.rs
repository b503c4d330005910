//! packets - builders for the Ethernet frames fed to the pipeline

use pnet_packet::Packet;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{IcmpPacket, IcmpTypes};
use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet_packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet_packet::ipv6::MutableIpv6Packet;
use pnet_packet::tcp::{self, MutableTcpPacket};
use pnet_packet::udp::{self, MutableUdpPacket};
use std::net::{Ipv4Addr, Ipv6Addr};

pub const GTPU_PORT: u16 = 2152; // TS29.281
pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;
pub const ETHERTYPE_ARP: u16 = 0x0806;

pub const PEER_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0xaa];
pub const LOCAL_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0xbb];

const IPV4_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const UDP_HEADER_LEN: usize = 8;
const TCP_HEADER_LEN: usize = 20;
const ICMP_ECHO_HEADER_LEN: usize = 8;

/// Ethernet II frame from `PEER_MAC` to `LOCAL_MAC`.
pub fn ethernet(ether_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(&LOCAL_MAC);
    frame.extend_from_slice(&PEER_MAC);
    frame.extend_from_slice(&ether_type.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// IPv4 packet around an L4 segment, with a valid header checksum.
pub fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: IpNextHeaderProtocol, l4: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; IPV4_HEADER_LEN + l4.len()];
    let mut ip = MutableIpv4Packet::new(&mut packet).unwrap();
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_total_length((IPV4_HEADER_LEN + l4.len()) as u16);
    ip.set_ttl(64);
    ip.set_next_level_protocol(protocol);
    ip.set_source(src);
    ip.set_destination(dst);
    ip.set_payload(l4);
    let checksum = ipv4::checksum(&ip.to_immutable());
    ip.set_checksum(checksum);
    packet
}

pub fn ipv6(src: Ipv6Addr, dst: Ipv6Addr, next_header: IpNextHeaderProtocol, l4: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; IPV6_HEADER_LEN + l4.len()];
    let mut ip = MutableIpv6Packet::new(&mut packet).unwrap();
    ip.set_version(6);
    ip.set_payload_length(l4.len() as u16);
    ip.set_next_header(next_header);
    ip.set_hop_limit(64);
    ip.set_source(src);
    ip.set_destination(dst);
    ip.set_payload(l4);
    packet
}

fn udp_segment(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut segment = vec![0u8; UDP_HEADER_LEN + payload.len()];
    let mut udp = MutableUdpPacket::new(&mut segment).unwrap();
    udp.set_source(src_port);
    udp.set_destination(dst_port);
    udp.set_length((UDP_HEADER_LEN + payload.len()) as u16);
    udp.set_payload(payload);
    segment
}

pub fn ipv4_udp(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut segment = udp_segment(src_port, dst_port, payload);
    let mut udp = MutableUdpPacket::new(&mut segment).unwrap();
    let checksum = udp::ipv4_checksum(&udp.to_immutable(), &src, &dst);
    udp.set_checksum(checksum);
    ipv4(src, dst, IpNextHeaderProtocols::Udp, &segment)
}

pub fn ipv6_udp(src: Ipv6Addr, dst: Ipv6Addr, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut segment = udp_segment(src_port, dst_port, payload);
    let mut udp = MutableUdpPacket::new(&mut segment).unwrap();
    let checksum = udp::ipv6_checksum(&udp.to_immutable(), &src, &dst);
    udp.set_checksum(checksum);
    ipv6(src, dst, IpNextHeaderProtocols::Udp, &segment)
}

pub fn ipv4_tcp(src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut segment = vec![0u8; TCP_HEADER_LEN];
    let mut tcp = MutableTcpPacket::new(&mut segment).unwrap();
    tcp.set_source(src_port);
    tcp.set_destination(dst_port);
    tcp.set_sequence(1);
    tcp.set_data_offset(5);
    tcp.set_window(65535);
    let checksum = tcp::ipv4_checksum(&tcp.to_immutable(), &src, &dst);
    tcp.set_checksum(checksum);
    ipv4(src, dst, IpNextHeaderProtocols::Tcp, &segment)
}

pub fn ipv4_icmp_echo_request(src: Ipv4Addr, dst: Ipv4Addr, sequence: u16) -> Vec<u8> {
    let data = b"ping";
    let mut message = vec![0u8; ICMP_ECHO_HEADER_LEN + data.len()];
    let mut echo = MutableEchoRequestPacket::new(&mut message).unwrap();
    echo.set_icmp_type(IcmpTypes::EchoRequest);
    echo.set_identifier(0x1234);
    echo.set_sequence_number(sequence);
    echo.set_payload(data);
    let checksum = pnet_packet::icmp::checksum(&IcmpPacket::new(echo.packet()).unwrap());
    echo.set_checksum(checksum);
    ipv4(src, dst, IpNextHeaderProtocols::Icmp, &message)
}

/// GTP-U header with no optional fields.
pub fn gtpu_header(message_type: u8, teid: u32, payload_len: usize) -> Vec<u8> {
    let mut header = vec![0b001_1_0_0_0_0, message_type];
    header.extend_from_slice(&(payload_len as u16).to_be_bytes());
    header.extend_from_slice(&teid.to_be_bytes());
    header
}

/// IPv4/UDP/GTP-U packet from `src` to `dst` carrying `payload`.
pub fn gtpu(src: Ipv4Addr, dst: Ipv4Addr, message_type: u8, teid: u32, payload: &[u8]) -> Vec<u8> {
    let mut message = gtpu_header(message_type, teid, payload.len());
    message.extend_from_slice(payload);
    gtpu_message(src, dst, &message)
}

/// IPv4/UDP packet to the GTP-U port carrying a complete GTP-U message.
pub fn gtpu_message(src: Ipv4Addr, dst: Ipv4Addr, message: &[u8]) -> Vec<u8> {
    let segment = udp_segment(GTPU_PORT, GTPU_PORT, message);
    ipv4(src, dst, IpNextHeaderProtocols::Udp, &segment)
}

/// The IPv4 packet in a frame.
pub fn ipv4_of(frame: &[u8]) -> Ipv4Packet<'_> {
    Ipv4Packet::new(&frame[14..]).unwrap()
}

pub fn ipv4_checksum_ok(packet: &Ipv4Packet) -> bool {
    ipv4::checksum(packet) == packet.get_checksum()
}

/// The payload of the IPv4 packet, up to its total length.
pub fn ipv4_payload<'a>(packet: &'a Ipv4Packet) -> &'a [u8] {
    let header_len = packet.get_header_length() as usize * 4;
    &packet.packet()[header_len..packet.get_total_length() as usize]
}
