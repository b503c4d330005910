//! rate_limiter - per-QER sliding window admission control

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Burst that a window absorbs.
pub const WINDOW_SIZE: Duration = Duration::from_millis(5);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Source of monotonic time, in nanoseconds.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Nanoseconds since the clock was created, plus one window so that a fresh window can
/// admit a full burst straight away.  Copies share the anchor, so every worker holding one
/// reads the same time base.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        let elapsed = self.anchor.elapsed() + WINDOW_SIZE;
        u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// The window start timestamp of one QER in one direction.
///
/// Each admitted packet advances the start by its transmission time at the configured rate.
/// A packet is refused if that would move the start past the present.  Once the start has
/// fallen more than a window behind the present it is pulled forward, so that idle time
/// can be spent on at most one window's worth of burst.
#[derive(Debug, Default)]
pub struct SlidingWindow {
    start_ns: AtomicU64,
}

impl SlidingWindow {
    pub fn new() -> Self {
        SlidingWindow::default()
    }

    pub fn start_ns(&self) -> u64 {
        self.start_ns.load(Ordering::Relaxed)
    }

    /// Try to admit `len` bytes at `rate` bits per second.  A rate of zero admits nothing.
    pub fn try_admit(&self, len: usize, rate: u64, now_ns: u64) -> bool {
        if rate == 0 {
            return false;
        }
        let tx_ns = transmission_time_ns(len, rate);
        let window_ns = WINDOW_SIZE.as_nanos() as u64;

        let mut start = self.start_ns.load(Ordering::Relaxed);
        loop {
            if start.saturating_add(tx_ns) > now_ns {
                return false;
            }
            let new_start = if start.saturating_add(window_ns) < now_ns {
                now_ns.saturating_sub(window_ns).saturating_add(tx_ns)
            } else {
                start + tx_ns
            };
            match self.start_ns.compare_exchange_weak(
                start,
                new_start,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => start = current,
            }
        }
    }
}

fn transmission_time_ns(len: usize, rate: u64) -> u64 {
    let ns = (len as u128) * 8 * NANOS_PER_SEC / rate as u128;
    u64::try_from(ns).unwrap_or(u64::MAX)
}
