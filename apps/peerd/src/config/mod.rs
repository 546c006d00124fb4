use std::net::SocketAddr;
use std::path::Path;

use config::Config;
use serde::Deserialize;

mod logger;
pub use logger::LoggerConfig;

#[derive(Deserialize)]
pub struct PeerConfig {
    /// Address this peer listens for inbound calls on. Port `0` lets
    /// the OS pick one.
    pub listen_address: SocketAddr,

    /// Address of the name service this peer joins through.
    pub name_service: SocketAddr,

    #[serde(default)]
    pub logger: LoggerConfig,
}

impl PeerConfig {
    pub fn from_path(path: &Path) -> eyre::Result<Self> {
        let config = Config::builder()
            .add_source(config::File::from(path))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
