use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskctl=warn,common=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run()
}
