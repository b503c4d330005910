//! routes_file - static routing table loaded from a TOML file
//!
//! ```toml
//! [[route]]
//! prefix = "192.168.1.0/24"
//! interface = "eth1"
//! src_mac = "020000000001"
//! dst_mac = "020000000002"
//! mtu = 1500
//!
//! [[route]]
//! prefix = "192.0.2.0/24"
//! kind = "blackhole"
//! ```
//!
//! A forward route without MAC addresses leaves neighbor resolution to the host stack.

use super::IpMask;
use crate::userplane::{RouteKind, StaticRoute, StaticRoutes};
use anyhow::{Context, Result, anyhow, bail};
use gtpu::headers::MacAddr;
use hex::FromHex;
use serde::Deserialize;
use slog::{Logger, error, info};
use std::fs;

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct RoutesFile {
    route: Vec<RouteEntry>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum RouteEntryKind {
    #[default]
    Forward,
    Blackhole,
    Unreachable,
    Prohibit,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RouteEntry {
    prefix: String,
    #[serde(default)]
    kind: RouteEntryKind,
    interface: Option<String>,
    src_mac: Option<String>,
    dst_mac: Option<String>,
    mtu: Option<u16>,
}

/// Load the routes from file.  `ifindex` maps interface names to indexes.
pub fn load_routes_file(
    filename: &str,
    ifindex: impl Fn(&str) -> Result<u32>,
    logger: &Logger,
) -> Result<StaticRoutes> {
    let path = std::env::current_dir()?;
    let contents = fs::read_to_string(filename).inspect_err(|e| {
        error!(
            logger,
            "Failed to load routes file {filename} (current directory {}) with error code {e}",
            path.display()
        )
    })?;
    let routes = parse_routes(&contents, ifindex)?;
    for route in routes.iter() {
        info!(logger, "Route {:?} {:?}", route.prefix, route.kind);
    }
    info!(logger, "Loaded {} routes from {filename}", routes.len());
    Ok(StaticRoutes::new(routes))
}

pub fn parse_routes(contents: &str, ifindex: impl Fn(&str) -> Result<u32>) -> Result<Vec<StaticRoute>> {
    let file: RoutesFile = toml::from_str(contents)?;
    file.route
        .into_iter()
        .map(|entry| {
            let prefix = IpMask::parse(&entry.prefix)
                .map_err(|e| anyhow!("Bad route prefix {} - {e}", entry.prefix))?;
            let kind = match entry.kind {
                RouteEntryKind::Forward => forward_route(&entry, &ifindex)?,
                RouteEntryKind::Blackhole => RouteKind::Blackhole,
                RouteEntryKind::Unreachable => RouteKind::Unreachable,
                RouteEntryKind::Prohibit => RouteKind::Prohibit,
            };
            Ok(StaticRoute { prefix, kind })
        })
        .collect()
}

fn forward_route(entry: &RouteEntry, ifindex: impl Fn(&str) -> Result<u32>) -> Result<RouteKind> {
    let Some(interface) = &entry.interface else {
        bail!("Route {} has no interface", entry.prefix)
    };
    let out_ifindex =
        ifindex(interface).with_context(|| format!("Route {} interface {interface}", entry.prefix))?;
    let neighbor = match (&entry.src_mac, &entry.dst_mac) {
        (Some(src), Some(dst)) => Some((mac(src)?, mac(dst)?)),
        (None, None) => None,
        _ => bail!("Route {} needs both or neither of src_mac and dst_mac", entry.prefix),
    };
    Ok(RouteKind::Forward {
        out_ifindex,
        neighbor,
        mtu: entry.mtu,
    })
}

fn mac(s: &str) -> Result<MacAddr> {
    let digits: String = s.chars().filter(|c| *c != ':').collect();
    MacAddr::from_hex(digits).with_context(|| format!("Bad MAC address {s}"))
}
