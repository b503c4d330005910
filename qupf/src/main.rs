//! main - starts a UPF user plane on the given interfaces

use anyhow::Result;
use async_std::channel::Sender;
use async_std::prelude::*;
use clap::Parser;
use qupf::{Config, Upf};
use signal_hook::consts::signal::*;
use signal_hook_async_std::Signals;
use slog::{Drain, Logger, o};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Network interface to process packets from.  Repeat for each N3 / N6 / N9 interface.
    #[arg(long = "interface", required = true)]
    interfaces: Vec<String>,

    /// TOML file of PDRs, FARs, QERs and URRs to install at startup.
    #[arg(long, default_value = "sessions.toml")]
    sessions: String,

    /// TOML file of static routes used to forward processed packets.
    #[arg(long, default_value = "routes.toml")]
    routes: String,

    /// Seconds between statistics logs.
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,

    /// Compute UDP checksums of rewritten IPv4 packets.  By default they are zeroed.
    /// Checksums over IPv6 are always computed.
    #[arg(long)]
    udp_checksums: bool,

    /// Bytes reserved in front of each received frame for GTP-U encapsulation.
    #[arg(long, default_value_t = 256)]
    headroom: usize,
}

#[async_std::main]
async fn main() -> Result<()> {
    exit_on_panic();
    let logger = init_logging();

    let args = Args::parse();
    let upf = Upf::start(
        Config {
            interfaces: args.interfaces,
            sessions_file: args.sessions,
            routes_file: args.routes,
            stats_interval: Duration::from_secs(args.stats_interval),
            udp_checksums: args.udp_checksums,
            headroom: args.headroom,
        },
        logger,
    )
    .await?;

    wait_for_signal().await?;
    upf.graceful_shutdown().await;

    Ok(())
}

fn init_logging() -> Logger {
    // Use info level logging by default
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info") }
    }
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog_envlogger::new(drain);
    slog::Logger::root(drain, o!())
}

fn exit_on_panic() {
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::exit(1);
    }));
}

async fn wait_for_signal() -> Result<i32> {
    let signals = Signals::new([SIGHUP, SIGTERM, SIGINT, SIGQUIT])?;
    let handle = signals.handle();
    let (sig_sender, sig_receiver) = async_std::channel::unbounded();
    let signals_task = async_std::task::spawn(handle_signals(signals, sig_sender));
    let signal = sig_receiver.recv().await;
    handle.close();
    signals_task.await;
    Ok(signal?)
}

async fn handle_signals(signals: Signals, sig_sender: Sender<i32>) {
    let mut signals = signals.fuse();
    while let Some(signal) = signals.next().await {
        match signal {
            // Sessions and routes are only read at startup.
            SIGHUP => {}
            SIGTERM | SIGINT | SIGQUIT => {
                let _ = sig_sender.send(signal).await;
            }
            _ => unreachable!(),
        }
    }
}
