//! session_tables - PDR / FAR / QER / URR lookup tables read by the pipeline

use super::rate_limiter::SlidingWindow;
use crate::data::{FarInfo, GateStatus, PdrInfo, QerInfo};
use dashmap::DashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Uplink,
    Downlink,
}

impl Direction {
    fn index(self) -> usize {
        match self {
            Direction::Uplink => 0,
            Direction::Downlink => 1,
        }
    }
}

/// The lookups and state updates the pipeline makes per packet.  Lookups return copies,
/// so that a rule removed concurrently is simply not found.
pub trait SessionTables: Send + Sync {
    fn lookup_pdr_uplink(&self, teid: u32) -> Option<PdrInfo>;
    fn lookup_pdr_downlink_v4(&self, ip: Ipv4Addr) -> Option<PdrInfo>;
    fn lookup_pdr_downlink_v6(&self, ip: Ipv6Addr) -> Option<PdrInfo>;
    fn lookup_far(&self, far_id: u32) -> Option<FarInfo>;
    fn lookup_qer(&self, qer_id: u32) -> Option<QerInfo>;

    /// Apply the QER's gate and rate limit for one packet of `len` bytes.  False if the QER
    /// does not exist, the gate is closed or the rate would be exceeded.
    fn try_admit(&self, qer_id: u32, direction: Direction, len: usize, now_ns: u64) -> bool;

    /// Add `len` bytes to a URR's volume counter.  Unknown URRs are ignored.
    fn account_usage(&self, urr_id: u32, direction: Direction, len: usize);
}

struct QerEntry {
    info: QerInfo,
    windows: [SlidingWindow; 2],
}

/// Uplink and downlink byte counts of a URR.
#[derive(Debug, Default)]
pub struct UrrCounters {
    bytes: [AtomicU64; 2],
}

impl UrrCounters {
    pub fn get(&self, direction: Direction) -> u64 {
        self.bytes[direction.index()].load(Ordering::Relaxed)
    }
}

/// Session tables held in concurrent maps, written by provisioning and read by every pipeline
/// worker.
#[derive(Clone, Default)]
pub struct Sessions {
    pdr_uplink: Arc<DashMap<u32, PdrInfo>>,
    pdr_downlink_v4: Arc<DashMap<Ipv4Addr, PdrInfo>>,
    pdr_downlink_v6: Arc<DashMap<Ipv6Addr, PdrInfo>>,
    far: Arc<DashMap<u32, FarInfo>>,
    qer: Arc<DashMap<u32, QerEntry>>,
    urr: Arc<DashMap<u32, UrrCounters>>,
}

impl Sessions {
    pub fn new() -> Self {
        Sessions::default()
    }

    pub fn put_pdr_uplink(&self, teid: u32, pdr: PdrInfo) {
        self.pdr_uplink.insert(teid, pdr);
    }
    pub fn delete_pdr_uplink(&self, teid: u32) {
        self.pdr_uplink.remove(&teid);
    }
    pub fn put_pdr_downlink_v4(&self, ip: Ipv4Addr, pdr: PdrInfo) {
        self.pdr_downlink_v4.insert(ip, pdr);
    }
    pub fn delete_pdr_downlink_v4(&self, ip: Ipv4Addr) {
        self.pdr_downlink_v4.remove(&ip);
    }
    pub fn put_pdr_downlink_v6(&self, ip: Ipv6Addr, pdr: PdrInfo) {
        self.pdr_downlink_v6.insert(ip, pdr);
    }
    pub fn delete_pdr_downlink_v6(&self, ip: Ipv6Addr) {
        self.pdr_downlink_v6.remove(&ip);
    }
    pub fn put_far(&self, far_id: u32, far: FarInfo) {
        self.far.insert(far_id, far);
    }
    pub fn delete_far(&self, far_id: u32) {
        self.far.remove(&far_id);
    }

    /// Install or update a QER.  An update keeps the rate limiter state.
    pub fn put_qer(&self, qer_id: u32, info: QerInfo) {
        self.qer
            .entry(qer_id)
            .and_modify(|e| e.info = info)
            .or_insert_with(|| QerEntry {
                info,
                windows: Default::default(),
            });
    }
    pub fn delete_qer(&self, qer_id: u32) {
        self.qer.remove(&qer_id);
    }

    pub fn put_urr(&self, urr_id: u32) {
        self.urr.entry(urr_id).or_default();
    }
    pub fn delete_urr(&self, urr_id: u32) {
        self.urr.remove(&urr_id);
    }

    /// Bytes accounted to a URR so far, if it exists.
    pub fn urr_bytes(&self, urr_id: u32, direction: Direction) -> Option<u64> {
        self.urr.get(&urr_id).map(|c| c.get(direction))
    }

    pub fn pdr_count(&self) -> usize {
        self.pdr_uplink.len() + self.pdr_downlink_v4.len() + self.pdr_downlink_v6.len()
    }
}

impl SessionTables for Sessions {
    fn lookup_pdr_uplink(&self, teid: u32) -> Option<PdrInfo> {
        self.pdr_uplink.get(&teid).map(|r| *r)
    }
    fn lookup_pdr_downlink_v4(&self, ip: Ipv4Addr) -> Option<PdrInfo> {
        self.pdr_downlink_v4.get(&ip).map(|r| *r)
    }
    fn lookup_pdr_downlink_v6(&self, ip: Ipv6Addr) -> Option<PdrInfo> {
        self.pdr_downlink_v6.get(&ip).map(|r| *r)
    }
    fn lookup_far(&self, far_id: u32) -> Option<FarInfo> {
        self.far.get(&far_id).map(|r| *r)
    }
    fn lookup_qer(&self, qer_id: u32) -> Option<QerInfo> {
        self.qer.get(&qer_id).map(|r| r.info)
    }

    fn try_admit(&self, qer_id: u32, direction: Direction, len: usize, now_ns: u64) -> bool {
        let Some(entry) = self.qer.get(&qer_id) else {
            return false;
        };
        let (gate, rate) = match direction {
            Direction::Uplink => (entry.info.ul_gate, entry.info.ul_max_bitrate),
            Direction::Downlink => (entry.info.dl_gate, entry.info.dl_max_bitrate),
        };
        if gate == GateStatus::Closed {
            return false;
        }
        entry.windows[direction.index()].try_admit(len, rate, now_ns)
    }

    fn account_usage(&self, urr_id: u32, direction: Direction, len: usize) {
        if let Some(counters) = self.urr.get(&urr_id) {
            counters.bytes[direction.index()].fetch_add(len as u64, Ordering::Relaxed);
        }
    }
}
