use std::net::SocketAddr;
use std::path::Path;

use config::Config;
use serde::Deserialize;

mod logger;
pub use logger::LoggerConfig;

#[derive(Deserialize)]
pub struct ServiceConfig {
    /// Address the name service listens on. Port `0` lets the OS pick
    /// one, which is only useful for tests, not real deployments.
    pub listen_address: SocketAddr,

    #[serde(default)]
    pub logger: LoggerConfig,
}

impl ServiceConfig {
    pub fn from_path(path: &Path) -> eyre::Result<Self> {
        let config = Config::builder()
            .add_source(config::File::from(path))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
