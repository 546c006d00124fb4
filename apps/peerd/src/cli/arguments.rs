use std::path::PathBuf;

use clap::Args;

#[derive(Args)]
pub struct Run {
    /// Path to this peer's configuration file.
    #[clap(long, short, default_value = "peerd.toml")]
    pub config: PathBuf,
}
