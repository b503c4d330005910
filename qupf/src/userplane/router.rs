//! router - next hop resolution and the final redirect decision

use super::Action;
use crate::data::IpMask;
use gtpu::PacketView;
use gtpu::headers::MacAddr;
use slog::{Logger, trace};
use std::net::IpAddr;
use thiserror::Error;

/// The parameters of a forwarding table lookup, taken from the outgoing packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibLookup {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub tos: u8,
    pub protocol: u8,
    pub tot_len: u16,
    pub ingress_ifindex: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextHop {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub out_ifindex: u32,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFailure {
    #[error("Blackhole route")]
    Blackhole,
    #[error("Destination unreachable")]
    Unreachable,
    #[error("Destination prohibited")]
    Prohibit,
    #[error("No route")]
    NotForwarded,
    #[error("Forwarding disabled on interface")]
    ForwardingDisabled,
    #[error("No neighbor entry for next hop")]
    NoNeighbor,
    #[error("Fragmentation needed")]
    FragmentationNeeded,
}

impl RouteFailure {
    /// Blackhole, unreachable and prohibit routes mean the packet is discarded.  Anything else
    /// is left to the kernel, which can resolve neighbors, fragment or send ICMP errors.
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            RouteFailure::Blackhole | RouteFailure::Unreachable | RouteFailure::Prohibit
        )
    }
}

/// The forwarding table and neighbor cache.
pub trait RouteResolver: Send + Sync {
    fn resolve_next_hop(&self, lookup: &FibLookup) -> Result<NextHop, RouteFailure>;
}

/// Route the packet by its outermost parsed IP header, rewriting the Ethernet addresses for
/// the next hop.
pub fn route<R: RouteResolver + ?Sized>(
    view: &mut PacketView,
    resolver: &R,
    ingress_ifindex: u32,
    logger: &Logger,
) -> Action {
    let lookup = if let Some(ip) = view.ip4() {
        FibLookup {
            src: IpAddr::V4(ip.source()),
            dst: IpAddr::V4(ip.destination()),
            tos: ip.tos(),
            protocol: ip.protocol(),
            tot_len: ip.total_length(),
            ingress_ifindex,
        }
    } else if let Some(ip) = view.ip6() {
        FibLookup {
            src: IpAddr::V6(ip.source()),
            dst: IpAddr::V6(ip.destination()),
            tos: ip.traffic_class(),
            protocol: ip.next_header(),
            tot_len: ip.payload_length(),
            ingress_ifindex,
        }
    } else {
        return Action::Pass;
    };

    match resolver.resolve_next_hop(&lookup) {
        Ok(hop) => {
            let Some(mut eth) = view.eth_mut() else {
                return Action::Pass;
            };
            eth.set_destination(hop.dst_mac);
            eth.set_source(hop.src_mac);
            trace!(logger, "{} -> {} redirect to if {}", lookup.src, lookup.dst, hop.out_ifindex);
            Action::Redirect(hop.out_ifindex)
        }
        Err(e) => {
            trace!(logger, "{} -> {}: {e}", lookup.src, lookup.dst);
            if e.is_drop() { Action::Drop } else { Action::Pass }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Forward {
        out_ifindex: u32,
        neighbor: Option<(MacAddr, MacAddr)>,
        mtu: Option<u16>,
    },
    Blackhole,
    Unreachable,
    Prohibit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRoute {
    pub prefix: IpMask,
    pub kind: RouteKind,
}

/// A fixed routing table with longest prefix match.  A `Forward` route without neighbor
/// addresses resolves to `NoNeighbor`.
#[derive(Debug, Clone, Default)]
pub struct StaticRoutes {
    routes: Vec<StaticRoute>,
}

impl StaticRoutes {
    pub fn new(mut routes: Vec<StaticRoute>) -> Self {
        routes.sort_by_key(|r| std::cmp::Reverse(r.prefix.prefix_len()));
        StaticRoutes { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteResolver for StaticRoutes {
    fn resolve_next_hop(&self, lookup: &FibLookup) -> Result<NextHop, RouteFailure> {
        let route = self
            .routes
            .iter()
            .find(|r| r.prefix.matches(lookup.dst))
            .ok_or(RouteFailure::NotForwarded)?;
        match route.kind {
            RouteKind::Forward {
                out_ifindex,
                neighbor,
                mtu,
            } => {
                if mtu.is_some_and(|mtu| lookup.tot_len > mtu) {
                    return Err(RouteFailure::FragmentationNeeded);
                }
                let (src_mac, dst_mac) = neighbor.ok_or(RouteFailure::NoNeighbor)?;
                Ok(NextHop {
                    dst_mac,
                    src_mac,
                    out_ifindex,
                })
            }
            RouteKind::Blackhole => Err(RouteFailure::Blackhole),
            RouteKind::Unreachable => Err(RouteFailure::Unreachable),
            RouteKind::Prohibit => Err(RouteFailure::Prohibit),
        }
    }
}
