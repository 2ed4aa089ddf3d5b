use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use crate::runner::RunnerConfig;

#[derive(Parser, Debug)]
#[command(name = "taskrunner", version)]
#[command(about = "Procesa tareas encoladas en un directorio compartido")]
pub struct Cli {
    /// Directorio raíz de tareas (contiene submitted/, processing/, done/)
    #[arg(value_name = "TASKDIR")]
    pub taskdir: PathBuf,

    /// Directorio con los archivos protein coding por dataset
    #[arg(long, env = "TASKRUNNER_PROTEIN_CODING_DIR")]
    pub protein_coding_dir: Option<PathBuf>,

    /// Sufijo de los archivos protein coding
    #[arg(long, env = "TASKRUNNER_PROTEIN_CODING_SUFFIX", default_value = ".txt")]
    pub protein_coding_suffix: String,

    /// Segundos de espera cuando no hay tareas
    #[arg(long, env = "TASKRUNNER_WAIT_TIME", default_value_t = 30)]
    pub wait_time: u64,

    /// No atender pedidos de borrado
    #[arg(long, env = "TASKRUNNER_DISABLE_DELETE")]
    pub disable_delete: bool,

    /// Servidor NDEx de donde se bajan las redes
    #[arg(long, env = "TASKRUNNER_NDEX_SERVER", default_value = "public.ndexbio.org")]
    pub ndex_server: String,

    /// Comando que ejecuta el cómputo de cada tarea
    #[arg(long, env = "TASKRUNNER_COMPUTE_CMD")]
    pub compute_cmd: PathBuf,

    /// No borrar el archivo SNP al terminar la tarea
    #[arg(long)]
    pub keep_temp_files: bool,

    /// Más detalle en los logs (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn runner_config(&self) -> Result<RunnerConfig> {
        if !self.taskdir.is_dir() {
            bail!("{} no es un directorio", self.taskdir.display());
        }
        let task_root = self
            .taskdir
            .canonicalize()
            .with_context(|| format!("no se pudo resolver {}", self.taskdir.display()))?;

        Ok(RunnerConfig {
            task_root,
            wait_time: Duration::from_secs(self.wait_time),
            delete_enabled: !self.disable_delete,
            delete_temp_files: !self.keep_temp_files,
            version: common::VERSION.to_string(),
        })
    }
}

/// `RUST_LOG` manda; si no está, el nivel sale de `-v`.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("taskrunner={level},common={level},reqwest=info"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
