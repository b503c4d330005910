use anyhow::{Result, ensure};
use gtpu::GTPU_ENCAP_LEN;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Interfaces whose frames are run through the pipeline.
    pub interfaces: Vec<String>,

    // Session provisioning file.
    pub sessions_file: String,

    // Static route file.
    pub routes_file: String,

    // How often to log the statistics.
    pub stats_interval: Duration,

    // Compute UDP checksums of rewritten IPv4 packets instead of zeroing them.
    pub udp_checksums: bool,

    // Bytes reserved in front of each received frame for encapsulation.
    pub headroom: usize,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.interfaces.is_empty(), "No interfaces configured");
        ensure!(
            self.headroom >= GTPU_ENCAP_LEN,
            "Headroom of {} bytes is too small for GTP-U encapsulation ({GTPU_ENCAP_LEN} bytes)",
            self.headroom
        );
        ensure!(
            !self.stats_interval.is_zero(),
            "Statistics interval must be non-zero"
        );
        Ok(())
    }
}
