use eyre::Result;

mod cli;
mod config;
mod repl;
mod shutdown;

fn main() -> Result<()> {
    cli::run()
}
