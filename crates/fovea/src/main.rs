mod cli;
mod hooks;
mod status;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    // stdout carries the hook protocol; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Hook => hooks::run()?,
        Commands::Status => {
            status::run()?;
            0
        }
        Commands::Version => {
            println!("fovea {}", env!("CARGO_PKG_VERSION"));
            0
        }
    };
    std::process::exit(code)
}
