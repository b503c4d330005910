//! cursor - bounds-checked sequential parsing of one frame
//!
//! Each parser checks that the remaining frame holds the whole fixed header before reading
//! it, advances the cursor past it, and records the header's offset so that later stages can
//! get a typed view of it.  A parser that fails leaves the cursor where it was.

use crate::buffer::FrameBuffer;
use crate::headers::*;
use crate::{GTPU_G_PDU, IPPROTO_TCP, IPPROTO_UDP};
use std::net::IpAddr;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Truncated {header} header: need {needed} bytes, {available} remain")]
    Truncated {
        header: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("Bad {header} header")]
    Malformed { header: &'static str },
}

/// Offsets, from the start of the frame, of the headers parsed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layers {
    pub eth: Option<usize>,
    pub ip4: Option<usize>,
    pub ip6: Option<usize>,
    pub udp: Option<usize>,
    pub tcp: Option<usize>,
    pub gtp: Option<usize>,
}

/// Parse position within a frame.  Holds no reference to the frame, so that the frame can be
/// rewritten between parsing steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    offset: usize,
    layers: Layers,
}

impl Cursor {
    pub fn new() -> Self {
        Cursor::default()
    }

    /// A cursor positioned at `offset`, with nothing parsed yet.
    pub fn at(offset: usize) -> Self {
        Cursor {
            offset,
            layers: Layers::default(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    /// Reposition after the frame has been rewritten underneath the cursor.
    pub(crate) fn reset(&mut self, offset: usize, layers: Layers) {
        self.offset = offset;
        self.layers = layers;
    }

    /// Bytes of `data` starting at the cursor, provided at least `len` remain.
    fn take<'a>(&self, data: &'a [u8], header: &'static str, len: usize) -> Result<&'a [u8], ParseError> {
        let available = data.len().saturating_sub(self.offset);
        if available < len {
            return Err(ParseError::Truncated {
                header,
                needed: len,
                available,
            });
        }
        Ok(&data[self.offset..])
    }

    /// Returns the EtherType.
    pub fn parse_ethernet(&mut self, data: &[u8]) -> Result<u16, ParseError> {
        let bytes = self.take(data, "Ethernet", ETH_HEADER_LEN)?;
        let ether_type = EthernetHeader::new(bytes)
            .map(|eth| eth.ether_type())
            .ok_or(ParseError::Malformed { header: "Ethernet" })?;
        self.layers.eth = Some(self.offset);
        self.offset += ETH_HEADER_LEN;
        Ok(ether_type)
    }

    /// Returns the IP protocol number of the payload.  Advances past any options.
    pub fn parse_ipv4(&mut self, data: &[u8]) -> Result<u8, ParseError> {
        let bytes = self.take(data, "IPv4", IPV4_HEADER_LEN)?;
        let ip = Ipv4Header::new(bytes).ok_or(ParseError::Malformed { header: "IPv4" })?;
        let header_len = ip.header_len();
        if header_len < IPV4_HEADER_LEN {
            return Err(ParseError::Malformed { header: "IPv4" });
        }
        if bytes.len() < header_len {
            return Err(ParseError::Truncated {
                header: "IPv4",
                needed: header_len,
                available: bytes.len(),
            });
        }
        let protocol = ip.protocol();
        self.layers.ip4 = Some(self.offset);
        self.offset += header_len;
        Ok(protocol)
    }

    /// Returns the next header field.  Extension headers are not followed.
    pub fn parse_ipv6(&mut self, data: &[u8]) -> Result<u8, ParseError> {
        let bytes = self.take(data, "IPv6", IPV6_HEADER_LEN)?;
        let next_header = Ipv6Header::new(bytes)
            .map(|ip| ip.next_header())
            .ok_or(ParseError::Malformed { header: "IPv6" })?;
        self.layers.ip6 = Some(self.offset);
        self.offset += IPV6_HEADER_LEN;
        Ok(next_header)
    }

    /// Returns the destination port.
    pub fn parse_udp(&mut self, data: &[u8]) -> Result<u16, ParseError> {
        let bytes = self.take(data, "UDP", UDP_HEADER_LEN)?;
        let port = UdpHeader::new(bytes)
            .map(|udp| udp.destination_port())
            .ok_or(ParseError::Malformed { header: "UDP" })?;
        self.layers.udp = Some(self.offset);
        self.offset += UDP_HEADER_LEN;
        Ok(port)
    }

    /// Returns the destination port.  TCP options are skipped only as far as the fixed header.
    pub fn parse_tcp(&mut self, data: &[u8]) -> Result<u16, ParseError> {
        let bytes = self.take(data, "TCP", TCP_HEADER_LEN)?;
        let port = TcpHeader::new(bytes)
            .map(|tcp| tcp.destination_port())
            .ok_or(ParseError::Malformed { header: "TCP" })?;
        self.layers.tcp = Some(self.offset);
        self.offset += TCP_HEADER_LEN;
        Ok(port)
    }

    /// Returns the GTP-U message type.  The cursor ends up after the optional fields when E, S
    /// or PN is set, and for a G-PDU also after the extension header, so that it points at the
    /// inner packet.  Fails if those fields are cut short.
    pub fn parse_gtp(&mut self, data: &[u8]) -> Result<u8, ParseError> {
        let bytes = self.take(data, "GTP-U", GTPU_HEADER_LEN)?;
        let gtp = GtpuHeader::new(bytes).ok_or(ParseError::Malformed { header: "GTP-U" })?;
        let message_type = gtp.message_type();
        let header_len = match (gtp.has_optional_fields(), message_type) {
            (false, _) => GTPU_HEADER_LEN,
            (true, GTPU_G_PDU) => gtp.header_len(),
            (true, _) => GTPU_HEADER_LEN + GTPU_OPTIONAL_LEN,
        };
        if bytes.len() < header_len {
            return Err(ParseError::Truncated {
                header: "GTP-U",
                needed: header_len,
                available: bytes.len(),
            });
        }
        self.layers.gtp = Some(self.offset);
        self.offset += header_len;
        Ok(message_type)
    }
}

/// The 5-tuple of an IP packet, with ports zero when the packet is neither TCP nor UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiveTuple {
    pub protocol: u8,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FiveTuple {
    /// Read the 5-tuple of the IP packet at the start of `packet`.  Fails if the IP header, or
    /// the TCP/UDP header it announces, is truncated.
    pub fn extract(packet: &[u8]) -> Result<FiveTuple, ParseError> {
        let mut cursor = Cursor::new();
        let version = packet.first().map(|b| b >> 4);
        let (protocol, src, dst) = match version {
            Some(4) => {
                let protocol = cursor.parse_ipv4(packet)?;
                let ip = Ipv4Header::new(packet).ok_or(ParseError::Malformed { header: "IPv4" })?;
                (protocol, IpAddr::V4(ip.source()), IpAddr::V4(ip.destination()))
            }
            Some(6) => {
                let protocol = cursor.parse_ipv6(packet)?;
                let ip = Ipv6Header::new(packet).ok_or(ParseError::Malformed { header: "IPv6" })?;
                (protocol, IpAddr::V6(ip.source()), IpAddr::V6(ip.destination()))
            }
            Some(_) => return Err(ParseError::Malformed { header: "IP" }),
            None => {
                return Err(ParseError::Truncated {
                    header: "IP",
                    needed: 1,
                    available: 0,
                });
            }
        };

        let (src_port, dst_port) = match protocol {
            IPPROTO_UDP => {
                let dst_port = cursor.parse_udp(packet)?;
                let udp = UdpHeader::new(&packet[cursor.offset() - UDP_HEADER_LEN..])
                    .ok_or(ParseError::Malformed { header: "UDP" })?;
                (udp.source_port(), dst_port)
            }
            IPPROTO_TCP => {
                let dst_port = cursor.parse_tcp(packet)?;
                let tcp = TcpHeader::new(&packet[cursor.offset() - TCP_HEADER_LEN..])
                    .ok_or(ParseError::Malformed { header: "TCP" })?;
                (tcp.source_port(), dst_port)
            }
            _ => (0, 0),
        };

        Ok(FiveTuple {
            protocol,
            src,
            dst,
            src_port,
            dst_port,
        })
    }
}

/// One frame being processed: exclusive access to its buffer plus the parse state.
///
/// Created when a frame enters the pipeline and dropped when the terminal action is decided.
pub struct PacketView<'a> {
    frame: &'a mut FrameBuffer,
    cursor: Cursor,
}

impl<'a> PacketView<'a> {
    pub fn new(frame: &'a mut FrameBuffer) -> Self {
        PacketView {
            frame,
            cursor: Cursor::new(),
        }
    }

    pub fn data(&self) -> &[u8] {
        self.frame.data()
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.cursor.offset()
    }

    pub fn layers(&self) -> &Layers {
        self.cursor.layers()
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        self.frame.data_mut()
    }

    /// The unparsed remainder of the frame.
    pub fn remaining(&self) -> &[u8] {
        self.frame.data().get(self.cursor.offset()..).unwrap_or(&[])
    }

    pub fn parse_ethernet(&mut self) -> Result<u16, ParseError> {
        self.cursor.parse_ethernet(self.frame.data())
    }

    pub fn parse_ipv4(&mut self) -> Result<u8, ParseError> {
        self.cursor.parse_ipv4(self.frame.data())
    }

    pub fn parse_ipv6(&mut self) -> Result<u8, ParseError> {
        self.cursor.parse_ipv6(self.frame.data())
    }

    pub fn parse_udp(&mut self) -> Result<u16, ParseError> {
        self.cursor.parse_udp(self.frame.data())
    }

    pub fn parse_tcp(&mut self) -> Result<u16, ParseError> {
        self.cursor.parse_tcp(self.frame.data())
    }

    pub fn parse_gtp(&mut self) -> Result<u8, ParseError> {
        self.cursor.parse_gtp(self.frame.data())
    }

    /// 5-tuple of the IP packet the cursor last parsed an IP header for.
    pub fn five_tuple(&self) -> Result<FiveTuple, ParseError> {
        let ip = self.layers().ip4.or(self.layers().ip6).ok_or(ParseError::Malformed { header: "IP" })?;
        FiveTuple::extract(&self.frame.data()[ip..])
    }

    pub fn eth(&self) -> Option<EthernetHeader<&[u8]>> {
        self.header(self.layers().eth)
    }
    pub fn ip4(&self) -> Option<Ipv4Header<&[u8]>> {
        self.header(self.layers().ip4)
    }
    pub fn ip6(&self) -> Option<Ipv6Header<&[u8]>> {
        self.header(self.layers().ip6)
    }
    pub fn udp(&self) -> Option<UdpHeader<&[u8]>> {
        self.header(self.layers().udp)
    }
    pub fn tcp(&self) -> Option<TcpHeader<&[u8]>> {
        self.header(self.layers().tcp)
    }
    pub fn gtp(&self) -> Option<GtpuHeader<&[u8]>> {
        self.header(self.layers().gtp)
    }

    pub fn eth_mut(&mut self) -> Option<EthernetHeader<&mut [u8]>> {
        let offset = self.layers().eth;
        self.header_mut(offset)
    }
    pub fn ip4_mut(&mut self) -> Option<Ipv4Header<&mut [u8]>> {
        let offset = self.layers().ip4;
        self.header_mut(offset)
    }
    pub fn ip6_mut(&mut self) -> Option<Ipv6Header<&mut [u8]>> {
        let offset = self.layers().ip6;
        self.header_mut(offset)
    }
    pub fn udp_mut(&mut self) -> Option<UdpHeader<&mut [u8]>> {
        let offset = self.layers().udp;
        self.header_mut(offset)
    }
    pub fn gtp_mut(&mut self) -> Option<GtpuHeader<&mut [u8]>> {
        let offset = self.layers().gtp;
        self.header_mut(offset)
    }

    fn header<'s, H>(&'s self, offset: Option<usize>) -> Option<H>
    where
        H: FromBytes<&'s [u8]>,
    {
        H::from_bytes(self.frame.data().get(offset?..)?)
    }

    fn header_mut<'s, H>(&'s mut self, offset: Option<usize>) -> Option<H>
    where
        H: FromBytes<&'s mut [u8]>,
    {
        H::from_bytes(self.frame.data_mut().get_mut(offset?..)?)
    }

    /// Give the codec direct access to the frame and cursor, for operations that resize the
    /// frame and therefore invalidate the parse state.
    pub(crate) fn parts(&mut self) -> (&mut FrameBuffer, &mut Cursor) {
        (&mut *self.frame, &mut self.cursor)
    }
}

/// Construction of a header view from a byte slice, used to share the offset lookup above.
pub trait FromBytes<T>: Sized {
    fn from_bytes(buf: T) -> Option<Self>;
}

macro_rules! from_bytes {
    ($($name:ident),*) => {
        $(
            impl<T: AsRef<[u8]>> FromBytes<T> for $name<T> {
                fn from_bytes(buf: T) -> Option<Self> {
                    $name::new(buf)
                }
            }
        )*
    };
}

from_bytes!(EthernetHeader, Ipv4Header, Ipv6Header, UdpHeader, TcpHeader, IcmpHeader, GtpuHeader);
