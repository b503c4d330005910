//! packet_processor - feeds frames from AF_PACKET sockets through the pipeline
//!
//! There is one worker per interface, each with its own pipeline and statistics.  A worker
//! sends Tx frames back out of its own socket and Redirect frames out of the socket of the
//! target interface.  Pass, Drop and Aborted frames are not sent.

use super::rate_limiter::MonotonicClock;
use super::router::StaticRoutes;
use super::session_tables::Sessions;
use super::statistics::{StatisticsRegistry, counter_indices::*};
use super::{Action, Pipeline};
use crate::data::Config;
use anyhow::{Context, Result, anyhow, bail};
use async_io::Async;
use async_std::task::{self, JoinHandle};
use slog::{Logger, debug, info, o, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::ffi::CString;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;
use stop_token::{StopSource, StopToken, prelude::*};

// Large enough for GRO-coalesced frames.
const MAX_FRAME_LEN: usize = 65536;

const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(100);

// Not in all libc versions.  linux/if_packet.h.
const PACKET_IGNORE_OUTGOING: libc::c_int = 23;

type Sockets = Arc<HashMap<u32, Arc<Async<Socket>>>>;

pub struct PacketProcessor {
    stop_source: StopSource,
    workers: Vec<JoinHandle<()>>,
    stats_task: JoinHandle<()>,
    registry: StatisticsRegistry,
}

impl PacketProcessor {
    /// Open a socket on each configured interface and start a worker on each.
    pub fn start(
        config: &Config,
        sessions: Sessions,
        routes: StaticRoutes,
        logger: &Logger,
    ) -> Result<Self> {
        let mut interfaces = Vec::new();
        for name in config.interfaces.iter() {
            let ifindex = interface_index(name)?;
            let socket = open_packet_socket(ifindex).with_context(|| format!("Interface {name}"))?;
            info!(logger, "Attached to interface {name} (index {ifindex})");
            interfaces.push((name.clone(), ifindex, Arc::new(Async::new(socket)?)));
        }
        let sockets: Sockets = Arc::new(
            interfaces
                .iter()
                .map(|(_, ifindex, socket)| (*ifindex, socket.clone()))
                .collect(),
        );

        let stop_source = StopSource::new();
        let registry = StatisticsRegistry::new();
        let clock = MonotonicClock::new();
        let mut workers = Vec::new();
        for (name, ifindex, socket) in interfaces {
            let logger = logger.new(o!("if" => name));
            let pipeline = Pipeline::new(
                sessions.clone(),
                routes.clone(),
                clock,
                registry.register(),
                logger.clone(),
            )
            .with_udp_checksums(config.udp_checksums);
            let worker = Worker {
                ifindex,
                socket,
                sockets: sockets.clone(),
                pipeline,
                headroom: config.headroom,
                logger,
            };
            workers.push(task::spawn(worker.run(stop_source.token())));
        }

        let stats = dump_stats(logger.clone(), registry.clone(), config.stats_interval)
            .timeout_at(stop_source.token());
        let stats_task = task::spawn(async move {
            let _ = stats.await;
        });

        Ok(PacketProcessor {
            stop_source,
            workers,
            stats_task,
            registry,
        })
    }

    pub fn statistics(&self) -> &StatisticsRegistry {
        &self.registry
    }

    /// Stop the workers and wait for them to finish.
    pub async fn graceful_shutdown(self) {
        drop(self.stop_source);
        for worker in self.workers {
            worker.await;
        }
        self.stats_task.await;
    }
}

struct Worker {
    ifindex: u32,
    socket: Arc<Async<Socket>>,
    sockets: Sockets,
    pipeline: Pipeline<Sessions, StaticRoutes, MonotonicClock>,
    headroom: usize,
    logger: Logger,
}

impl Worker {
    async fn run(self, stop_token: StopToken) {
        let mut frame = gtpu::FrameBuffer::new(self.headroom + MAX_FRAME_LEN, self.headroom);
        loop {
            let received = self
                .socket
                .read_with(|mut s: &Socket| s.read(frame.receive_space()))
                .timeout_at(stop_token.clone())
                .await;
            let len = match received {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => {
                    warn!(self.logger, "Receive failed - {e}");
                    let pause = receive_retry_delay(&e);
                    if task::sleep(pause).timeout_at(stop_token.clone()).await.is_err() {
                        break;
                    }
                    continue;
                }
                Err(_) => break,
            };
            if let Err(e) = frame.commit_received(len) {
                debug!(self.logger, "{e}");
                continue;
            }

            let action = self.pipeline.process(&mut frame, self.ifindex);
            if let Err(e) = self.send(action, frame.data()).await {
                debug!(self.logger, "Failed to send {action:?} frame - {e}");
            }
        }
        info!(self.logger, "Worker stopped");
    }

    async fn send(&self, action: Action, data: &[u8]) -> Result<()> {
        let socket = match action {
            Action::Tx => &self.socket,
            Action::Redirect(ifindex) => self
                .sockets
                .get(&ifindex)
                .ok_or(anyhow!("Not attached to interface index {ifindex}"))?,
            Action::Pass | Action::Drop | Action::Aborted => return Ok(()),
        };
        let sent = socket.write_with(|mut s: &Socket| s.write(data)).await?;
        if sent != data.len() {
            bail!("Sent {sent} of {} bytes", data.len());
        }
        Ok(())
    }
}

/// How long a worker waits before reading again after a failed read.  Errors that leave the
/// socket usable are retried at once.
fn receive_retry_delay(e: &io::Error) -> Duration {
    match e.kind() {
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Duration::ZERO,
        _ => RECEIVE_RETRY_DELAY,
    }
}

/// Index of the named network interface.
pub fn interface_index(name: &str) -> Result<u32> {
    let c_name = CString::new(name)?;
    match unsafe { libc::if_nametoindex(c_name.as_ptr()) } {
        0 => Err(io::Error::last_os_error()).context(format!("No interface {name}")),
        ifindex => Ok(ifindex),
    }
}

fn open_packet_socket(ifindex: u32) -> Result<Socket> {
    let eth_p_all = (libc::ETH_P_ALL as u16).to_be();
    let socket = Socket::new(
        Domain::PACKET,
        Type::RAW,
        Some(Protocol::from(eth_p_all as libc::c_int)),
    )
    .context("Failed to open packet socket - is CAP_NET_RAW missing?")?;

    // The frames this process sends must not be received again.
    let on: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_PACKET,
            PACKET_IGNORE_OUTGOING,
            &on as *const _ as *const libc::c_void,
            size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error()).context("setsockopt PACKET_IGNORE_OUTGOING");
    }

    let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as libc::c_ushort;
    addr.sll_protocol = eth_p_all;
    addr.sll_ifindex = ifindex as libc::c_int;
    let rc = unsafe {
        libc::bind(
            socket.as_raw_fd(),
            &addr as *const _ as *const libc::sockaddr,
            size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error()).context("bind");
    }
    Ok(socket)
}

async fn dump_stats(logger: Logger, registry: StatisticsRegistry, interval: Duration) {
    let mut last = [0usize; NUM_COUNTERS];
    const FIRST_WARN_IDX: usize = ACTION_DROP;

    loop {
        task::sleep(interval).await;
        let current = registry.merged();

        if current[RX_N3] != last[RX_N3] || current[RX_N6] != last[RX_N6] {
            info!(
                &logger,
                "N3 rx={} tx={} N6 rx={} tx={} GTP echo={} ARP={} redirect={} tx={} pass={}",
                current[RX_N3],
                current[TX_N3],
                current[RX_N6],
                current[TX_N6],
                current[RX_GTP_ECHO],
                current[RX_ARP],
                current[ACTION_REDIRECT],
                current[ACTION_TX],
                current[ACTION_PASS]
            );
        }

        let warn_needed = (FIRST_WARN_IDX..NUM_COUNTERS).any(|idx| current[idx] != last[idx]);
        if warn_needed {
            warn!(
                &logger,
                "DROPS drop={} aborted={} gtp_unexpected={}",
                current[ACTION_DROP],
                current[ACTION_ABORTED],
                current[RX_GTP_UNEXP]
            );
        }

        last = current;
    }
}
