use gtpu::FrameBuffer;
use gtpu::headers::MacAddr;
use qupf::data::{
    ApplyAction, FarInfo, GateStatus, OuterHeaderCreation, OuterHeaderRemoval, PdrInfo, QerInfo,
};
use qupf::userplane::{
    Action, Clock, FibLookup, NextHop, Pipeline, RouteFailure, RouteResolver, Sessions, Statistics,
};
use slog::{Drain, Logger, o};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const UPF_N3_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const GNB_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);
pub const PEER_UPF_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 2, 9);
pub const UE_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
pub const DN_IP: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

pub const N3_IFINDEX: u32 = 2;
pub const N6_IFINDEX: u32 = 3;
pub const NEXT_HOP_SRC_MAC: MacAddr = [0x02, 0, 0, 0, 0x01, 0x01];
pub const NEXT_HOP_DST_MAC: MacAddr = [0x02, 0, 0, 0, 0x01, 0x02];

pub const HEADROOM: usize = 256;
pub const UNTHROTTLED: u64 = 1_000_000_000;

pub fn init_logging() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build();
    let drain = std::sync::Mutex::new(drain).fuse();
    let drain = slog_envlogger::new(drain);
    slog::Logger::root(drain, o!())
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(now_ns: u64) -> Self {
        ManualClock(Arc::new(AtomicU64::new(now_ns)))
    }

    pub fn advance_ns(&self, ns: u64) {
        self.0.fetch_add(ns, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Routes everything out of one interface, or fails every lookup in a given way.  Records
/// the lookups it is asked to make.
#[derive(Clone)]
pub struct MockRouter {
    failure: Arc<Mutex<Option<RouteFailure>>>,
    lookups: Arc<Mutex<Vec<FibLookup>>>,
}

impl MockRouter {
    pub fn new() -> Self {
        MockRouter {
            failure: Arc::new(Mutex::new(None)),
            lookups: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fail_with(&self, failure: RouteFailure) {
        *self.failure.lock().unwrap() = Some(failure);
    }

    pub fn last_lookup(&self) -> Option<FibLookup> {
        self.lookups.lock().unwrap().last().copied()
    }
}

impl RouteResolver for MockRouter {
    fn resolve_next_hop(&self, lookup: &FibLookup) -> Result<NextHop, RouteFailure> {
        self.lookups.lock().unwrap().push(*lookup);
        match *self.failure.lock().unwrap() {
            Some(failure) => Err(failure),
            None => Ok(NextHop {
                dst_mac: NEXT_HOP_DST_MAC,
                src_mac: NEXT_HOP_SRC_MAC,
                out_ifindex: match lookup.dst {
                    IpAddr::V4(ip) if ip.octets()[0] == 192 => N3_IFINDEX,
                    _ => N6_IFINDEX,
                },
            }),
        }
    }
}

/// A pipeline over in-memory session tables, a mock router and a manual clock.
pub struct TestUpf {
    pub sessions: Sessions,
    pub router: MockRouter,
    pub clock: ManualClock,
    pub stats: Arc<Statistics>,
    pipeline: Pipeline<Sessions, MockRouter, ManualClock>,
}

impl TestUpf {
    pub fn new() -> Self {
        Self::with_udp_checksums(false)
    }

    pub fn with_udp_checksums(enabled: bool) -> Self {
        let sessions = Sessions::new();
        let router = MockRouter::new();
        let clock = ManualClock::new(1_000_000_000);
        let stats = Arc::new(Statistics::default());
        let pipeline = Pipeline::new(
            sessions.clone(),
            router.clone(),
            clock.clone(),
            stats.clone(),
            init_logging(),
        )
        .with_udp_checksums(enabled);
        TestUpf {
            sessions,
            router,
            clock,
            stats,
            pipeline,
        }
    }

    /// Process a frame received on `ingress_ifindex`, returning the action and the frame as it
    /// was left.
    pub fn process_on(&self, frame: &[u8], ingress_ifindex: u32) -> (Action, Vec<u8>) {
        let mut buffer = FrameBuffer::from_frame(frame, HEADROOM);
        let action = self.pipeline.process(&mut buffer, ingress_ifindex);
        (action, buffer.data().to_vec())
    }

    pub fn process_n3(&self, frame: &[u8]) -> (Action, Vec<u8>) {
        self.process_on(frame, N3_IFINDEX)
    }

    pub fn process_n6(&self, frame: &[u8]) -> (Action, Vec<u8>) {
        self.process_on(frame, N6_IFINDEX)
    }

    /// Downlink PDR for `UE_IP` using FAR 1 / QER 1, tunnelling to `GNB_IP` with `teid`.
    pub fn install_downlink_session(&self, teid: u32) {
        self.sessions.put_pdr_downlink_v4(UE_IP, pdr(1, 1));
        self.sessions.put_far(1, gtpu_far(teid, GNB_IP));
        self.sessions.put_qer(1, open_qer(UNTHROTTLED));
    }

    /// Uplink PDR for `teid` using FAR 2 / QER 1, decapsulating.
    pub fn install_uplink_session(&self, teid: u32) {
        let mut uplink = pdr(2, 1);
        uplink.outer_header_removal = Some(OuterHeaderRemoval::GtpUUdpIpv4);
        self.sessions.put_pdr_uplink(teid, uplink);
        self.sessions.put_far(2, forward_far());
        self.sessions.put_qer(1, open_qer(UNTHROTTLED));
    }
}

impl Default for TestUpf {
    fn default() -> Self {
        Self::new()
    }
}

pub fn pdr(far_id: u32, qer_id: u32) -> PdrInfo {
    PdrInfo {
        outer_header_removal: None,
        far_id,
        qer_id,
        urr_id: None,
        sdf: None,
    }
}

/// FAR that forwards without adding an outer header.
pub fn forward_far() -> FarInfo {
    FarInfo {
        action: ApplyAction::FORW,
        outer_header_creation: OuterHeaderCreation::default(),
        teid: 0,
        remote_ip: Ipv4Addr::UNSPECIFIED,
        local_ip: UPF_N3_IP,
        transport_level_marking: 0,
    }
}

/// FAR that forwards in a GTP-U tunnel from `UPF_N3_IP` to `remote_ip`.
pub fn gtpu_far(teid: u32, remote_ip: Ipv4Addr) -> FarInfo {
    FarInfo {
        outer_header_creation: OuterHeaderCreation::GTP_U_UDP_IPV4,
        teid,
        remote_ip,
        ..forward_far()
    }
}

pub fn open_qer(max_bitrate: u64) -> QerInfo {
    QerInfo {
        ul_gate: GateStatus::Open,
        dl_gate: GateStatus::Open,
        qfi: 9,
        ul_max_bitrate: max_bitrate,
        dl_max_bitrate: max_bitrate,
    }
}
