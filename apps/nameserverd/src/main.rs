use eyre::Result;

mod cli;
mod config;
mod registrar;
mod shutdown;

fn main() -> Result<()> {
    cli::run()
}
