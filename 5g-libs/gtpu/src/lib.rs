//! lib - GTP-U user plane packet handling
//!
//! Bounds-checked parsing of Ethernet / IPv4 / IPv6 / UDP / TCP / GTP-U frames held in a
//! `FrameBuffer`, plus the in-place rewrites a UPF performs on them.  TS29.281.

mod buffer;
pub mod checksum;
mod codec;
mod cursor;
pub mod headers;

pub use buffer::{BufferError, FrameBuffer};
pub use codec::*;
pub use cursor::{Cursor, FiveTuple, Layers, PacketView, ParseError};

pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_ARP: u16 = 0x0806;
pub const ETH_P_IPV6: u16 = 0x86dd;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_ICMPV6: u8 = 58;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

/// TS29.281, 4.4.2.3
pub const GTP_UDP_PORT: u16 = 2152;

/// Version 1, protocol type GTP, no optional fields.
pub const GTP_FLAGS: u8 = 0x30;

// TS29.281, 6.1
pub const GTPU_ECHO_REQUEST: u8 = 1;
pub const GTPU_ECHO_RESPONSE: u8 = 2;
pub const GTPU_ERROR_INDICATION: u8 = 26;
pub const GTPU_SUPPORTED_EXTENSION_HEADERS_NOTIFICATION: u8 = 31;
pub const GTPU_END_MARKER: u8 = 254;
pub const GTPU_G_PDU: u8 = 255;
