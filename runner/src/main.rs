use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

mod cli;
mod compute;
mod lock;
mod network;
mod runner;

use cli::Cli;
use compute::CommandEngine;
use lock::InstanceLock;
use network::NdexFetcher;
use runner::TaskRunner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose);

    let config = cli.runner_config()?;
    let _lock = InstanceLock::acquire(&config.task_root)?;
    info!(
        "taskrunner {} usando {}",
        config.version,
        config.task_root.display()
    );

    let network = Arc::new(NdexFetcher::new(&cli.ndex_server));
    let engine = Arc::new(CommandEngine::new(
        cli.compute_cmd.clone(),
        cli.protein_coding_dir.clone(),
        Some(cli.protein_coding_suffix.clone()),
    ));

    // Ctrl-C deja terminar la tarea en curso y sale en la próxima vuelta
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C recibido, saliendo al terminar la tarea actual");
            flag.store(false, Ordering::SeqCst);
        }
    });

    let mut runner = TaskRunner::new(config, network, engine);
    runner
        .run_tasks(|| running.load(Ordering::SeqCst))
        .await?;

    info!("taskrunner terminado");
    Ok(())
}
