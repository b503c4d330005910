//! sessions_file - static session provisioning from a TOML file
//!
//! ```toml
//! [[pdr_uplink]]
//! teid = 0x2a
//! far_id = 2
//! qer_id = 1
//! outer_header_removal = "GtpUUdpIpv4"
//!
//! [[pdr_downlink]]
//! ue_ip = "10.0.0.5"
//! far_id = 1
//! qer_id = 1
//! urr_id = 1
//! sdf = { filter = "permit out tcp from any to assigned 80", far_id = 3, qer_id = 1 }
//!
//! [[far]]
//! id = 1
//! action = 2
//! outer_header_creation = 1
//! teid = 0x2a
//! remote_ip = "192.168.1.2"
//! local_ip = "192.168.1.1"
//!
//! [[qer]]
//! id = 1
//! ul_max_bitrate = 100_000_000
//! dl_max_bitrate = 100_000_000
//!
//! [[urr]]
//! id = 1
//! ```

use super::{FarInfo, PdrInfo, QerInfo};
use crate::userplane::Sessions;
use anyhow::{Result, bail};
use serde::Deserialize;
use slog::{Logger, error, info, warn};
use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct SessionsFile {
    pdr_uplink: Vec<UplinkPdr>,
    pdr_downlink: Vec<DownlinkPdr>,
    far: Vec<Far>,
    qer: Vec<Qer>,
    urr: Vec<Urr>,
}

#[derive(Deserialize, Debug)]
struct UplinkPdr {
    teid: u32,
    #[serde(flatten)]
    pdr: PdrInfo,
}

#[derive(Deserialize, Debug)]
struct DownlinkPdr {
    ue_ip: IpAddr,
    #[serde(flatten)]
    pdr: PdrInfo,
}

#[derive(Deserialize, Debug)]
struct Far {
    id: u32,
    #[serde(flatten)]
    far: FarInfo,
}

#[derive(Deserialize, Debug)]
struct Qer {
    id: u32,
    #[serde(flatten)]
    qer: QerInfo,
}

#[derive(Deserialize, Debug)]
struct Urr {
    id: u32,
}

/// Load the sessions from file into the session tables.
pub fn load_sessions_file(filename: &str, sessions: &Sessions, logger: &Logger) -> Result<()> {
    let path = std::env::current_dir()?;
    let contents = fs::read_to_string(filename).inspect_err(|e| {
        error!(
            logger,
            "Failed to load sessions file {filename} (current directory {}) with error code {e}",
            path.display()
        )
    })?;
    install_sessions(&contents, sessions, logger)?;
    info!(logger, "Loaded {} PDRs from {filename}", sessions.pdr_count());
    Ok(())
}

/// Parse a sessions file and install its rules.  Nothing is installed if the file is invalid.
/// Rules that refer to a FAR or QER that the file does not define are installed anyway, with
/// a warning, since packets matching them are simply dropped.
pub fn install_sessions(contents: &str, sessions: &Sessions, logger: &Logger) -> Result<()> {
    let file: SessionsFile = toml::from_str(contents)?;

    let mut far_ids = HashSet::new();
    for far in file.far.iter() {
        if !far_ids.insert(far.id) {
            bail!("Duplicate FAR id {}", far.id);
        }
    }
    let mut qer_ids = HashSet::new();
    for qer in file.qer.iter() {
        if !qer_ids.insert(qer.id) {
            bail!("Duplicate QER id {}", qer.id);
        }
    }
    let mut urr_ids = HashSet::new();
    for urr in file.urr.iter() {
        if !urr_ids.insert(urr.id) {
            bail!("Duplicate URR id {}", urr.id);
        }
    }
    let mut teids = HashSet::new();
    for entry in file.pdr_uplink.iter() {
        if !teids.insert(entry.teid) {
            bail!("Duplicate uplink PDR for TEID {:#x}", entry.teid);
        }
    }
    let mut ue_ips = HashSet::new();
    for entry in file.pdr_downlink.iter() {
        if !ue_ips.insert(entry.ue_ip) {
            bail!("Duplicate downlink PDR for {}", entry.ue_ip);
        }
    }

    let check_refs = |key: &dyn std::fmt::Display, pdr: &PdrInfo| {
        let mut far_refs = vec![pdr.far_id];
        let mut qer_refs = vec![pdr.qer_id];
        if let Some(sdf) = pdr.sdf {
            far_refs.push(sdf.far_id);
            qer_refs.push(sdf.qer_id);
        }
        for far_id in far_refs.into_iter().filter(|id| !far_ids.contains(id)) {
            warn!(logger, "PDR {key} refers to unknown FAR {far_id}");
        }
        for qer_id in qer_refs.into_iter().filter(|id| !qer_ids.contains(id)) {
            warn!(logger, "PDR {key} refers to unknown QER {qer_id}");
        }
        if let Some(urr_id) = pdr.urr_id.filter(|id| !urr_ids.contains(id)) {
            warn!(logger, "PDR {key} refers to unknown URR {urr_id}");
        }
    };

    for Far { id, far } in file.far {
        sessions.put_far(id, far);
    }
    for Qer { id, qer } in file.qer {
        sessions.put_qer(id, qer);
    }
    for Urr { id } in file.urr {
        sessions.put_urr(id);
    }
    for UplinkPdr { teid, pdr } in file.pdr_uplink {
        check_refs(&format_args!("TEID {teid:#x}"), &pdr);
        sessions.put_pdr_uplink(teid, pdr);
    }
    for DownlinkPdr { ue_ip, pdr } in file.pdr_downlink {
        check_refs(&ue_ip, &pdr);
        match ue_ip {
            IpAddr::V4(ip) => sessions.put_pdr_downlink_v4(ip, pdr),
            IpAddr::V6(ip) => sessions.put_pdr_downlink_v6(ip, pdr),
        }
    }
    Ok(())
}
