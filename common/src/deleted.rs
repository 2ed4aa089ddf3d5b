use std::{
    fs, io,
    path::{Path, PathBuf},
};

use glob::Pattern;
use tracing::{debug, error, info};

use crate::error::{Result, TaskError};
use crate::params::TaskParams;
use crate::state::{delete_requests_root, state_root, SEARCH_ORDER};
use crate::task::TaskDescriptor;

/// Resultado de consumir un pedido de borrado.
#[derive(Debug)]
pub enum DeletionTarget {
    /// Tarea encontrada; hay que borrarla.
    Task(TaskDescriptor),
    /// El pedido se consumió pero no había tarea con ese uuid.
    NotFound(String),
}

/// Lee los pedidos de borrado en `<taskroot>/delete_requests/<uuid>`.
pub struct DeletedTaskScanner {
    task_root: PathBuf,
    delete_req_dir: PathBuf,
}

impl DeletedTaskScanner {
    pub fn new(task_root: &Path) -> Self {
        Self {
            task_root: task_root.to_path_buf(),
            delete_req_dir: delete_requests_root(task_root),
        }
    }

    /// Consume el primer pedido de borrado que encuentre.
    ///
    /// El marcador se borra antes de resolver la tarea, así cada pedido se
    /// intenta una sola vez aunque la resolución falle. `Ok(None)` sólo
    /// cuando no quedan marcadores.
    pub fn next_deletion_target(&mut self) -> Result<Option<DeletionTarget>> {
        if !self.delete_req_dir.is_dir() {
            error!("{} no es un directorio", self.delete_req_dir.display());
            return Ok(None);
        }
        debug!(
            "buscando pedidos de borrado en {}",
            self.delete_req_dir.display()
        );

        let entries = fs::read_dir(&self.delete_req_dir)
            .map_err(|e| TaskError::io(&self.delete_req_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| TaskError::io(&self.delete_req_dir, e))?;
            let marker = entry.path();
            if !marker.is_file() {
                continue;
            }
            let uuid = entry.file_name().to_string_lossy().to_string();

            info!("borrando pedido de borrado: {}", marker.display());
            match fs::remove_file(&marker) {
                Ok(()) => {}
                // otro proceso ya lo consumió
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(TaskError::io(&marker, e)),
            }

            return match find_task(&self.task_root, &uuid)? {
                Some(task) => Ok(Some(DeletionTarget::Task(task))),
                None => {
                    info!("no se encontró la tarea {}", uuid);
                    Ok(Some(DeletionTarget::NotFound(uuid)))
                }
            };
        }
        Ok(None)
    }
}

/// Busca `<state>/*/<uuid>` en processing, submitted y done, en ese orden.
///
/// Un descriptor ausente o ilegible no impide devolver la tarea: alcanza con
/// que exista el directorio.
pub fn find_task(task_root: &Path, uuid: &str) -> Result<Option<TaskDescriptor>> {
    for state in SEARCH_ORDER {
        let root = state_root(task_root, state);
        let pattern = format!(
            "{}/*/{}",
            Pattern::escape(&root.to_string_lossy()),
            Pattern::escape(uuid)
        );
        let paths = glob::glob(&pattern).map_err(|e| {
            TaskError::io(&root, io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
        })?;

        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    error!("no se pudo leer {}: {}", e.path().display(), e);
                    continue;
                }
            };
            if !path.is_dir() {
                error!("se encontró {} pero no es un directorio", path.display());
                continue;
            }
            return Ok(Some(match TaskDescriptor::load(&path) {
                Ok(task) => task,
                Err(e) => {
                    error!("se ignora el descriptor de {}: {}", path.display(), e);
                    TaskDescriptor::new(Some(path), TaskParams::default())
                }
            }));
        }
    }
    Ok(None)
}
