//! pipeline - classifies each frame, applies the session's PDR / FAR / QER, rewrites and routes it

use super::Action;
use super::rate_limiter::Clock;
use super::router::{RouteResolver, route};
use super::session_tables::{Direction, SessionTables};
use super::statistics::{Statistics, counter_indices::*};
use crate::data::{FarInfo, OuterHeaderRemoval, PdrInfo};
use gtpu::*;
use slog::{Logger, debug, trace};
use std::net::IpAddr;
use std::sync::Arc;

/// The rule ids in force for one packet, after the PDR's SDF filter has been evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SelectedRules {
    far_id: u32,
    qer_id: u32,
    urr_id: Option<u32>,
    outer_header_removal: Option<OuterHeaderRemoval>,
}

impl SelectedRules {
    /// The PDR's own rules, unless its SDF filter matches the packet.  A packet whose 5-tuple
    /// cannot be read does not match.  A matching SDF that sets no outer header removal keeps
    /// the PDR's.
    fn select(pdr: &PdrInfo, packet: Result<FiveTuple, ParseError>) -> Self {
        match (pdr.sdf, packet) {
            (Some(sdf), Ok(packet)) if sdf.filter.matches(&packet) => SelectedRules {
                far_id: sdf.far_id,
                qer_id: sdf.qer_id,
                urr_id: pdr.urr_id,
                outer_header_removal: sdf.outer_header_removal.or(pdr.outer_header_removal),
            },
            _ => SelectedRules {
                far_id: pdr.far_id,
                qer_id: pdr.qer_id,
                urr_id: pdr.urr_id,
                outer_header_removal: pdr.outer_header_removal,
            },
        }
    }
}

/// The per-frame state machine.  One pipeline serves one worker, which owns its statistics;
/// the session tables and router are shared.
pub struct Pipeline<T: SessionTables, R: RouteResolver, C: Clock> {
    tables: T,
    router: R,
    clock: C,
    stats: Arc<Statistics>,
    udp_checksums: bool,
    logger: Logger,
}

impl<T: SessionTables, R: RouteResolver, C: Clock> Pipeline<T, R, C> {
    pub fn new(tables: T, router: R, clock: C, stats: Arc<Statistics>, logger: Logger) -> Self {
        Pipeline {
            tables,
            router,
            clock,
            stats,
            udp_checksums: false,
            logger,
        }
    }

    /// Compute UDP checksums of rewritten IPv4 packets rather than zeroing them.
    pub fn with_udp_checksums(mut self, enabled: bool) -> Self {
        self.udp_checksums = enabled;
        self
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.stats
    }

    /// Run one received frame through the pipeline, rewriting it in place, and return what
    /// should be done with it.
    pub fn process(&self, frame: &mut FrameBuffer, ingress_ifindex: u32) -> Action {
        let mut view = PacketView::new(frame);
        let action = match view.parse_ethernet() {
            Ok(ETH_P_IP) => self.handle_ip4(&mut view, ingress_ifindex),
            Ok(ETH_P_IPV6) => self.handle_ip6(&mut view, ingress_ifindex),
            Ok(ETH_P_ARP) => {
                self.stats.inc(RX_ARP);
                Action::Pass
            }
            Ok(_) => Action::Pass,
            Err(e) => {
                trace!(self.logger, "{e}");
                Action::Pass
            }
        };
        self.stats.record_action(action);
        action
    }

    fn handle_ip4(&self, view: &mut PacketView, ingress_ifindex: u32) -> Action {
        let protocol = match view.parse_ipv4() {
            Ok(protocol) => protocol,
            Err(e) => {
                trace!(self.logger, "{e}");
                return Action::Pass;
            }
        };
        self.stats.inc(RX_IP4);

        match protocol {
            IPPROTO_ICMP => self.stats.inc(RX_ICMP),
            IPPROTO_UDP => {
                self.stats.inc(RX_UDP);
                if view.parse_udp() == Ok(GTP_UDP_PORT) {
                    self.stats.inc(RX_N3);
                    return self.handle_gtpu(view, ingress_ifindex);
                }
            }
            IPPROTO_TCP => self.stats.inc(RX_TCP),
            _ => {
                self.stats.inc(RX_OTHER);
                return Action::Pass;
            }
        }

        self.stats.inc(RX_N6);
        self.handle_n6(view, ingress_ifindex)
    }

    fn handle_ip6(&self, view: &mut PacketView, ingress_ifindex: u32) -> Action {
        let next_header = match view.parse_ipv6() {
            Ok(next_header) => next_header,
            Err(e) => {
                trace!(self.logger, "{e}");
                return Action::Pass;
            }
        };
        self.stats.inc(RX_IP6);

        // GTP-U is only terminated over IPv4, so UDP here is N6 traffic.
        match next_header {
            IPPROTO_ICMPV6 => {
                self.stats.inc(RX_ICMP6);
                return Action::Pass;
            }
            IPPROTO_UDP => self.stats.inc(RX_UDP),
            IPPROTO_TCP => self.stats.inc(RX_TCP),
            _ => {
                self.stats.inc(RX_OTHER);
                return Action::Pass;
            }
        }

        self.stats.inc(RX_N6);
        self.handle_n6(view, ingress_ifindex)
    }

    fn handle_gtpu(&self, view: &mut PacketView, ingress_ifindex: u32) -> Action {
        match view.parse_gtp() {
            Ok(GTPU_G_PDU) => {
                self.stats.inc(RX_GTP_PDU);
                self.handle_uplink(view, ingress_ifindex)
            }
            Ok(GTPU_ECHO_REQUEST) => {
                self.stats.inc(RX_GTP_ECHO);
                match handle_echo_request(view) {
                    Ok(()) => Action::Tx,
                    Err(e) => {
                        debug!(self.logger, "Failed to build echo response - {e}");
                        Action::Aborted
                    }
                }
            }
            Ok(
                GTPU_ECHO_RESPONSE
                | GTPU_ERROR_INDICATION
                | GTPU_SUPPORTED_EXTENSION_HEADERS_NOTIFICATION
                | GTPU_END_MARKER,
            ) => {
                self.stats.inc(RX_GTP_OTHER);
                Action::Pass
            }
            Ok(message_type) => {
                self.stats.inc(RX_GTP_UNEXP);
                debug!(self.logger, "Unexpected GTP-U message type {message_type}");
                Action::Pass
            }
            Err(e) => {
                self.stats.inc(RX_GTP_UNEXP);
                trace!(self.logger, "{e}");
                Action::Pass
            }
        }
    }

    /// G-PDU from the access network (N3) or a peer UPF (N9).
    fn handle_uplink(&self, view: &mut PacketView, ingress_ifindex: u32) -> Action {
        let Some(teid) = view.gtp().map(|gtp| gtp.teid()) else {
            return Action::Pass;
        };
        let Some(pdr) = self.tables.lookup_pdr_uplink(teid) else {
            trace!(self.logger, "No session for TEID {teid:#x}");
            return Action::Pass;
        };

        // The SDF filter applies to the tunnelled packet.
        let rules = SelectedRules::select(&pdr, FiveTuple::extract(view.remaining()));
        let Some(far) = self.lookup_forwarding_far(rules.far_id) else {
            return Action::Drop;
        };
        if !self.police(&rules, Direction::Uplink, view.len()) {
            return Action::Drop;
        }

        if far.creates_gtpu_ipv4() {
            trace!(
                self.logger,
                "TEID {teid:#x} relayed to {} TEID {:#x}", far.remote_ip, far.teid
            );
            let rewritten = update_gtp_tunnel(view, far.local_ip, far.remote_ip, far.tos(), far.teid)
                .and_then(|_| fill_udp_checksum(view, self.udp_checksums));
            if let Err(e) = rewritten {
                debug!(self.logger, "Failed to rewrite tunnel for TEID {teid:#x} - {e}");
                return Action::Aborted;
            }
        } else if rules.outer_header_removal == Some(OuterHeaderRemoval::GtpUUdpIpv4) {
            if let Err(e) = remove_gtp_header(view) {
                debug!(self.logger, "Failed to decapsulate TEID {teid:#x} - {e}");
                return Action::Aborted;
            }
        }

        if is_icmp_to(view, &far) {
            match prepare_icmp_echo_reply(view, far.local_ip) {
                Ok(()) => {
                    trace!(self.logger, "Answering ping to {}", far.local_ip);
                    return self.handle_n6(view, ingress_ifindex);
                }
                Err(CodecError::NotEchoRequest) => {}
                Err(e) => {
                    debug!(self.logger, "Failed to build echo reply - {e}");
                    return Action::Aborted;
                }
            }
        }

        self.stats.inc(TX_N6);
        route(view, &self.router, ingress_ifindex, &self.logger)
    }

    /// IP packet from the data network, to be tunnelled to the UE.
    fn handle_n6(&self, view: &mut PacketView, ingress_ifindex: u32) -> Action {
        let (ue_ip, pdr) = if let Some(ip) = view.ip4() {
            let ue_ip = ip.destination();
            (IpAddr::V4(ue_ip), self.tables.lookup_pdr_downlink_v4(ue_ip))
        } else if let Some(ip) = view.ip6() {
            let ue_ip = ip.destination();
            (IpAddr::V6(ue_ip), self.tables.lookup_pdr_downlink_v6(ue_ip))
        } else {
            return Action::Pass;
        };
        let Some(pdr) = pdr else {
            trace!(self.logger, "No session for {ue_ip}");
            return Action::Pass;
        };

        let rules = SelectedRules::select(&pdr, view.five_tuple());
        let Some(far) = self.lookup_forwarding_far(rules.far_id) else {
            return Action::Drop;
        };
        if !far.creates_gtpu_ipv4() {
            debug!(
                self.logger,
                "FAR {} for {ue_ip} has unsupported outer header creation {:#x}",
                rules.far_id,
                far.outer_header_creation.0
            );
            return Action::Drop;
        }
        if !self.police(&rules, Direction::Downlink, view.len()) {
            return Action::Drop;
        }

        let encapsulated = add_gtp_header(view, far.local_ip, far.remote_ip, far.tos(), far.teid)
            .and_then(|_| fill_udp_checksum(view, self.udp_checksums));
        if let Err(e) = encapsulated {
            debug!(self.logger, "Failed to encapsulate packet for {ue_ip} - {e}");
            return Action::Aborted;
        }
        trace!(self.logger, "{ue_ip} -> TEID {:#x} at {}", far.teid, far.remote_ip);

        self.stats.inc(TX_N3);
        route(view, &self.router, ingress_ifindex, &self.logger)
    }

    /// The FAR, if it exists and forwards.
    fn lookup_forwarding_far(&self, far_id: u32) -> Option<FarInfo> {
        let Some(far) = self.tables.lookup_far(far_id) else {
            debug!(self.logger, "No FAR {far_id}");
            return None;
        };
        if !far.forwards() {
            trace!(self.logger, "FAR {far_id} action {:#x} does not forward", far.action.0);
            return None;
        }
        Some(far)
    }

    /// Apply the QER and, if the packet is admitted, account it to the URR.
    fn police(&self, rules: &SelectedRules, direction: Direction, len: usize) -> bool {
        if !self
            .tables
            .try_admit(rules.qer_id, direction, len, self.clock.now_ns())
        {
            trace!(self.logger, "QER {} refused {len} bytes {direction:?}", rules.qer_id);
            return false;
        }
        if let Some(urr_id) = rules.urr_id {
            self.tables.account_usage(urr_id, direction, len);
        }
        true
    }
}

fn is_icmp_to(view: &PacketView, far: &FarInfo) -> bool {
    view.ip4()
        .is_some_and(|ip| ip.destination() == far.local_ip && ip.protocol() == IPPROTO_ICMP)
}
