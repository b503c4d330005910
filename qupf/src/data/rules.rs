//! rules - the per-session forwarding and QoS rules that the pipeline looks up (TS29.244)

use super::sdf::SdfFilter;
use serde::Deserialize;
use std::net::Ipv4Addr;

/// Apply Action bits of a FAR.  TS29.244, 8.2.26.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct ApplyAction(pub u8);

impl ApplyAction {
    pub const DROP: ApplyAction = ApplyAction(0x01);
    pub const FORW: ApplyAction = ApplyAction(0x02);
    pub const BUFF: ApplyAction = ApplyAction(0x04);
    pub const NOCP: ApplyAction = ApplyAction(0x08);
    pub const DUPL: ApplyAction = ApplyAction(0x10);
    pub const IPMA: ApplyAction = ApplyAction(0x20);
    pub const IPMD: ApplyAction = ApplyAction(0x40);
    pub const DFRT: ApplyAction = ApplyAction(0x80);

    pub fn contains(&self, other: ApplyAction) -> bool {
        self.0 & other.0 == other.0
    }
}

/// First octet of the Outer Header Creation description.  TS29.244, 8.2.56.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct OuterHeaderCreation(pub u8);

impl OuterHeaderCreation {
    pub const GTP_U_UDP_IPV4: OuterHeaderCreation = OuterHeaderCreation(0x01);
    pub const GTP_U_UDP_IPV6: OuterHeaderCreation = OuterHeaderCreation(0x02);
    pub const UDP_IPV4: OuterHeaderCreation = OuterHeaderCreation(0x04);
    pub const UDP_IPV6: OuterHeaderCreation = OuterHeaderCreation(0x08);

    pub fn contains(&self, other: OuterHeaderCreation) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

/// Outer Header Removal description.  TS29.244, 8.2.64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[repr(u8)]
pub enum OuterHeaderRemoval {
    GtpUUdpIpv4 = 0,
    GtpUUdpIpv6 = 1,
    UdpIpv4 = 2,
    UdpIpv6 = 3,
    Ipv4 = 4,
    Ipv6 = 5,
    GtpUUdpIp = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum GateStatus {
    #[default]
    Open = 0,
    Closed = 1,
}

/// The FAR / QER / outer header removal to use instead of the PDR's own, for packets that
/// match the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SdfRules {
    pub filter: SdfFilter,
    pub far_id: u32,
    pub qer_id: u32,
    /// Unset means the PDR's own outer header removal applies.
    #[serde(default)]
    pub outer_header_removal: Option<OuterHeaderRemoval>,
}

/// Packet Detection Rule, as installed against a TEID (uplink) or UE IP address (downlink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PdrInfo {
    #[serde(default)]
    pub outer_header_removal: Option<OuterHeaderRemoval>,
    pub far_id: u32,
    pub qer_id: u32,
    #[serde(default)]
    pub urr_id: Option<u32>,
    #[serde(default)]
    pub sdf: Option<SdfRules>,
}

/// Forwarding Action Rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FarInfo {
    pub action: ApplyAction,
    #[serde(default)]
    pub outer_header_creation: OuterHeaderCreation,
    #[serde(default)]
    pub teid: u32,
    #[serde(default = "unspecified")]
    pub remote_ip: Ipv4Addr,
    #[serde(default = "unspecified")]
    pub local_ip: Ipv4Addr,
    #[serde(default)]
    pub transport_level_marking: u16,
}

fn unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

impl FarInfo {
    pub fn forwards(&self) -> bool {
        self.action.contains(ApplyAction::FORW)
    }

    pub fn creates_gtpu_ipv4(&self) -> bool {
        self.outer_header_creation
            .contains(OuterHeaderCreation::GTP_U_UDP_IPV4)
    }

    /// ToS / traffic class of the outer header: the first octet of the transport level marking.
    /// TS29.244, 8.2.12.
    pub fn tos(&self) -> u8 {
        (self.transport_level_marking >> 8) as u8
    }
}

/// QoS Enforcement Rule.  Bitrates are in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QerInfo {
    #[serde(default)]
    pub ul_gate: GateStatus,
    #[serde(default)]
    pub dl_gate: GateStatus,
    #[serde(default)]
    pub qfi: u8,
    pub ul_max_bitrate: u64,
    pub dl_max_bitrate: u64,
}
