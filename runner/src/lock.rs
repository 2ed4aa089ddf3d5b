use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use common::log_if_err;
use tracing::debug;

pub const LOCK_FILE: &str = ".taskrunner.lock";

/// Un solo runner por directorio de tareas: dos runners podrían tomar la
/// misma tarea de `submitted` a la vez.
///
/// El archivo se crea con create-or-fail y se borra al soltar el lock.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(task_root: &Path) -> Result<Self> {
        let path = task_root.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path).unwrap_or_default();
                bail!(
                    "ya hay otro runner usando {} (pid {}); si no es así, borrar {}",
                    task_root.display(),
                    owner.trim(),
                    path.display()
                );
            }
            Err(e) => {
                return Err(e).with_context(|| format!("no se pudo crear {}", path.display()))
            }
        };
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("no se pudo escribir {}", path.display()))?;
        debug!("lock tomado: {}", path.display());
        Ok(Self { path })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        debug!("soltando lock {}", self.path.display());
        log_if_err("borrar el lock", fs::remove_file(&self.path));
    }
}
