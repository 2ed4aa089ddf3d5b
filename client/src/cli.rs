use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use common::{find_task, list_tasks, request_deletion, submit_task, TaskParams};
use serde_json::Value;
use tracing::debug;

#[derive(Parser)]
#[command(name = "taskctl", version)]
#[command(about = "CLI simple para enviar y consultar tareas del taskrunner")]
pub struct Cli {
    /// Directorio raíz de tareas
    #[arg(long, env = "TASKCTL_TASKDIR", default_value = ".")]
    pub taskdir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Envía una tarea nueva
    Submit {
        /// IP de quien envía (agrupa las tareas)
        #[arg(long, default_value = "127.0.0.1")]
        ip: String,

        /// Id de la red en NDEx
        #[arg(long)]
        ndex: Option<String>,

        /// Número u "optimal"
        #[arg(long)]
        alpha: Option<String>,

        #[arg(long)]
        window: Option<u64>,

        #[arg(long)]
        protein_coding: Option<String>,

        /// Etiquetas de columnas del archivo SNP, "chrom,bp,pval"
        #[arg(long)]
        snp_labels: Option<String>,

        /// Archivo SNP a copiar dentro de la tarea
        #[arg(long, value_name = "ARCHIVO")]
        snp_file: Option<PathBuf>,

        /// Parámetro extra clave=valor (el valor se toma como JSON si parsea)
        #[arg(long = "param", value_name = "CLAVE=VALOR")]
        params: Vec<String>,
    },
    /// Consulta el estado de una tarea
    Status {
        #[arg(value_name = "UUID")]
        uuid: String,
    },
    /// Lista todas las tareas
    List,
    /// Pide el borrado de una tarea
    Delete {
        #[arg(value_name = "UUID")]
        uuid: String,
    },
    /// Muestra el resultado de una tarea terminada
    Result {
        #[arg(value_name = "UUID")]
        uuid: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.taskdir.as_path();
    debug!("usando directorio de tareas {}", root.display());

    match cli.command {
        Commands::Submit {
            ip,
            ndex,
            alpha,
            window,
            protein_coding,
            snp_labels,
            snp_file,
            params,
        } => {
            let mut p = TaskParams {
                ndex,
                alpha: alpha.map(|a| parse_value(&a)),
                window: window.map(Value::from),
                protein_coding,
                snp_level_summary_col_labels: snp_labels,
                ..Default::default()
            };
            for kv in &params {
                let (k, v) = parse_param(kv)?;
                p.extra.insert(k, v);
            }
            let task = submit_task(root, &ip, p, snp_file.as_deref())?;
            println!("Tarea creada:");
            println!("  uuid: {}", task.uuid().unwrap_or_default());
            if let Some(dir) = task.dir() {
                println!("  dir : {}", dir.display());
            }
        }

        Commands::Status { uuid } => match find_task(root, &uuid)? {
            Some(task) => {
                println!("Tarea {}:", uuid);
                println!("  ip     : {}", task.ip_address().unwrap_or_default());
                println!(
                    "  estado : {}",
                    task.state().map(|s| s.to_string()).unwrap_or_default()
                );
                if let Some(err) = task.error_message() {
                    println!("  error  : {}", err);
                }
                if let Some(v) = &task.params.version {
                    println!("  versión: {}", v);
                }
                if let Some(dir) = task.dir() {
                    println!("  modificada: {}", modified(dir)?);
                }
            }
            None => println!("No se encontró la tarea {}", uuid),
        },

        Commands::List => {
            let tasks = list_tasks(root)?;
            if tasks.is_empty() {
                println!("No hay tareas.");
            }
            for t in tasks {
                println!(
                    "{:<10} {:<15} {}",
                    t.state.map(|s| s.to_string()).unwrap_or_default(),
                    t.ip_address.unwrap_or_default(),
                    t.uuid.unwrap_or_default()
                );
            }
        }

        Commands::Delete { uuid } => {
            let marker = request_deletion(root, &uuid)?;
            println!("Borrado pedido: {}", marker.display());
        }

        Commands::Result { uuid } => {
            let task =
                find_task(root, &uuid)?.ok_or_else(|| anyhow!("no se encontró la tarea {}", uuid))?;
            if let Some(err) = task.error_message() {
                bail!("la tarea terminó con error: {}", err);
            }
            match task.load_result()? {
                Some(res) => println!("{}", serde_json::to_string_pretty(&res)?),
                None => println!("La tarea {} todavía no tiene resultado", uuid),
            }
        }
    }

    Ok(())
}

/// Números, booleanos y JSON pasan tal cual; lo demás queda como string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_param(kv: &str) -> Result<(String, Value)> {
    let (k, v) = kv
        .split_once('=')
        .ok_or_else(|| anyhow!("parámetro inválido '{}', se espera clave=valor", kv))?;
    let k = k.trim();
    if k.is_empty() {
        bail!("parámetro sin clave: '{}'", kv);
    }
    Ok((k.to_string(), parse_value(v)))
}

fn modified(dir: &Path) -> Result<String> {
    let meta = fs::metadata(dir).with_context(|| format!("no se pudo leer {}", dir.display()))?;
    let when: DateTime<Local> = meta.modified()?.into();
    Ok(when.format("%Y-%m-%d %H:%M:%S").to_string())
}
