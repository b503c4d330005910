//! statistics - per-worker packet and action counters, merged on read

use super::Action;
use atomic_counter::{AtomicCounter, RelaxedCounter};
use dashmap::DashMap;
use derive_deref::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod counter_indices {
    pub const RX_ARP: usize = 0;
    pub const RX_ICMP: usize = 1;
    pub const RX_ICMP6: usize = 2;
    pub const RX_IP4: usize = 3;
    pub const RX_IP6: usize = 4;
    pub const RX_TCP: usize = 5;
    pub const RX_UDP: usize = 6;
    pub const RX_OTHER: usize = 7;
    pub const RX_GTP_ECHO: usize = 8;
    pub const RX_GTP_PDU: usize = 9;
    pub const RX_GTP_OTHER: usize = 10;
    pub const RX_GTP_UNEXP: usize = 11;
    pub const RX_N3: usize = 12;
    pub const RX_N6: usize = 13;
    pub const TX_N3: usize = 14;
    pub const TX_N6: usize = 15;
    pub const ACTION_PASS: usize = 16;
    pub const ACTION_TX: usize = 17;
    pub const ACTION_REDIRECT: usize = 18;
    // Counters from here on indicate packets lost.
    pub const ACTION_DROP: usize = 19;
    pub const ACTION_ABORTED: usize = 20;
    pub const NUM_COUNTERS: usize = 21;
}
use counter_indices::*;

/// The counters of one pipeline worker.
#[derive(Deref, Default, Debug)]
pub struct Statistics([RelaxedCounter; NUM_COUNTERS]);

impl Statistics {
    pub fn inc(&self, idx: usize) {
        self.0[idx].inc();
    }

    pub fn record_action(&self, action: Action) {
        self.inc(match action {
            Action::Pass => ACTION_PASS,
            Action::Drop => ACTION_DROP,
            Action::Tx => ACTION_TX,
            Action::Redirect(_) => ACTION_REDIRECT,
            Action::Aborted => ACTION_ABORTED,
        });
    }

    pub fn value(&self, idx: usize) -> usize {
        self.0[idx].get()
    }

    pub fn values(&self) -> [usize; NUM_COUNTERS] {
        std::array::from_fn(|idx| self.value(idx))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketStats {
    pub rx_arp: usize,
    pub rx_icmp: usize,
    pub rx_icmp6: usize,
    pub rx_ip4: usize,
    pub rx_ip6: usize,
    pub rx_tcp: usize,
    pub rx_udp: usize,
    pub rx_other: usize,
    pub rx_gtp_echo: usize,
    pub rx_gtp_pdu: usize,
    pub rx_gtp_other: usize,
    pub rx_gtp_unexp: usize,
    pub rx_n3: usize,
    pub rx_n6: usize,
    pub tx_n3: usize,
    pub tx_n6: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionStats {
    pub pass: usize,
    pub drop: usize,
    pub tx: usize,
    pub redirect: usize,
    pub aborted: usize,
}

/// All workers' counters.  Workers register as they start.
#[derive(Clone, Default)]
pub struct StatisticsRegistry {
    workers: Arc<DashMap<usize, Arc<Statistics>>>,
    next_id: Arc<AtomicUsize>,
}

impl StatisticsRegistry {
    pub fn new() -> Self {
        StatisticsRegistry::default()
    }

    pub fn register(&self) -> Arc<Statistics> {
        let stats = Arc::new(Statistics::default());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.workers.insert(id, stats.clone());
        stats
    }

    /// Sum of each counter over all workers.
    pub fn merged(&self) -> [usize; NUM_COUNTERS] {
        let mut totals = [0usize; NUM_COUNTERS];
        for worker in self.workers.iter() {
            for (total, value) in totals.iter_mut().zip(worker.values()) {
                *total += value;
            }
        }
        totals
    }

    pub fn packet_stats(&self) -> PacketStats {
        PacketStats::from(&self.merged())
    }

    pub fn action_stats(&self) -> ActionStats {
        ActionStats::from(&self.merged())
    }
}

impl From<&[usize; NUM_COUNTERS]> for PacketStats {
    fn from(c: &[usize; NUM_COUNTERS]) -> Self {
        PacketStats {
            rx_arp: c[RX_ARP],
            rx_icmp: c[RX_ICMP],
            rx_icmp6: c[RX_ICMP6],
            rx_ip4: c[RX_IP4],
            rx_ip6: c[RX_IP6],
            rx_tcp: c[RX_TCP],
            rx_udp: c[RX_UDP],
            rx_other: c[RX_OTHER],
            rx_gtp_echo: c[RX_GTP_ECHO],
            rx_gtp_pdu: c[RX_GTP_PDU],
            rx_gtp_other: c[RX_GTP_OTHER],
            rx_gtp_unexp: c[RX_GTP_UNEXP],
            rx_n3: c[RX_N3],
            rx_n6: c[RX_N6],
            tx_n3: c[TX_N3],
            tx_n6: c[TX_N6],
        }
    }
}

impl From<&[usize; NUM_COUNTERS]> for ActionStats {
    fn from(c: &[usize; NUM_COUNTERS]) -> Self {
        ActionStats {
            pass: c[ACTION_PASS],
            drop: c[ACTION_DROP],
            tx: c[ACTION_TX],
            redirect: c[ACTION_REDIRECT],
            aborted: c[ACTION_ABORTED],
        }
    }
}
