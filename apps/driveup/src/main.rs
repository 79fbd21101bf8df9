mod app;
mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load()?;

    tracing::info!(
        file = %args.file.display(),
        fresh = args.fresh,
        chunk_size = config.chunk_size,
        "driveup starting"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, args))?;

    Ok(())
}
