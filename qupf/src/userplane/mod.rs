mod packet_processor;
mod pipeline;
mod rate_limiter;
mod router;
mod session_tables;
mod statistics;

pub use packet_processor::{PacketProcessor, interface_index};
pub use pipeline::Pipeline;
pub use rate_limiter::{Clock, MonotonicClock, SlidingWindow, WINDOW_SIZE};
pub use router::{
    FibLookup, NextHop, RouteFailure, RouteKind, RouteResolver, StaticRoute, StaticRoutes, route,
};
pub use session_tables::{Direction, SessionTables, Sessions, UrrCounters};
pub use statistics::{ActionStats, PacketStats, Statistics, StatisticsRegistry, counter_indices};

/// What is done with a frame once the pipeline has finished with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Hand to the host network stack.
    Pass,
    Drop,
    /// Send back out of the interface it arrived on.
    Tx,
    /// Send out of the given interface.
    Redirect(u32),
    /// Internal failure.  Not sent.
    Aborted,
}
