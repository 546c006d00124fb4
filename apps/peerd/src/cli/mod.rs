mod actions;
mod arguments;

use clap::Parser;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub enum Cli {
    /// Join the lock group and open an interactive session, see `run --help`
    Run(arguments::Run),
}

impl Cli {
    pub fn exec(self) -> eyre::Result<()> {
        match self {
            Self::Run(args) => actions::run(args),
        }
    }
}

pub fn run() -> eyre::Result<()> {
    Cli::parse().exec()
}
