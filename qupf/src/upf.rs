use crate::data::{Config, routes_file, sessions_file};
use crate::userplane::{PacketProcessor, Sessions, StatisticsRegistry, interface_index};
use anyhow::Result;
use slog::{Logger, info};

pub struct Upf {
    sessions: Sessions,
    packet_processor: PacketProcessor,
    logger: Logger,
}

impl Upf {
    /// Provision the sessions and routes from their files and start processing packets.
    pub async fn start(config: Config, logger: Logger) -> Result<Self> {
        config.validate()?;
        let sessions = Sessions::new();
        sessions_file::load_sessions_file(&config.sessions_file, &sessions, &logger)?;
        let routes = routes_file::load_routes_file(&config.routes_file, interface_index, &logger)?;
        let packet_processor = PacketProcessor::start(&config, sessions.clone(), routes, &logger)?;
        info!(&logger, "Started on {}", config.interfaces.join(", "));
        Ok(Upf {
            sessions,
            packet_processor,
            logger,
        })
    }

    /// The live session tables.  Rules installed here take effect on the next packet.
    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn statistics(&self) -> &StatisticsRegistry {
        self.packet_processor.statistics()
    }

    pub async fn graceful_shutdown(self) {
        info!(&self.logger, "Shutting down");
        let registry = self.packet_processor.statistics().clone();
        self.packet_processor.graceful_shutdown().await;
        info!(&self.logger, "Final packet counts {:?}", registry.packet_stats());
        info!(&self.logger, "Final action counts {:?}", registry.action_stats());
    }
}
