use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, TaskError};

pub const SUBMITTED_DIR: &str = "submitted";
pub const PROCESSING_DIR: &str = "processing";
pub const DONE_DIR: &str = "done";
pub const DELETE_REQUESTS_DIR: &str = "delete_requests";

/// Orden en que se buscan las tareas a borrar.
pub const SEARCH_ORDER: [TaskState; 3] = [
    TaskState::Processing,
    TaskState::Submitted,
    TaskState::Done,
];

/// Estado de una tarea. El estado no se guarda en el descriptor: lo da el
/// directorio que contiene a la tarea.
///
/// `Error` sólo existe como destino de un movimiento; físicamente se guarda
/// en `done` con el mensaje en el descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Submitted,
    Processing,
    Done,
    Error,
}

impl TaskState {
    /// Estado físico: `Error` se resuelve a `Done`.
    pub fn resolved(self) -> TaskState {
        match self {
            TaskState::Error => TaskState::Done,
            other => other,
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self.resolved() {
            TaskState::Submitted => SUBMITTED_DIR,
            TaskState::Processing => PROCESSING_DIR,
            _ => DONE_DIR,
        }
    }

    pub fn from_dir_name(name: &str) -> Option<TaskState> {
        match name {
            SUBMITTED_DIR => Some(TaskState::Submitted),
            PROCESSING_DIR => Some(TaskState::Processing),
            DONE_DIR => Some(TaskState::Done),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Error => f.write_str("error"),
            other => f.write_str(other.dir_name()),
        }
    }
}

/// Ruta de una tarea: `<base>/<state>/<ip>/<uuid>`.
pub fn state_path(base: &Path, state: TaskState, ip: &str, uuid: &str) -> PathBuf {
    base.join(state.dir_name()).join(ip).join(uuid)
}

/// Directorio raíz de un estado: `<base>/<state>`.
pub fn state_root(base: &Path, state: TaskState) -> PathBuf {
    base.join(state.dir_name())
}

pub fn delete_requests_root(base: &Path) -> PathBuf {
    base.join(DELETE_REQUESTS_DIR)
}

/// Componentes recuperados a partir de la ruta de una tarea.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskLocation {
    pub base_dir: Option<PathBuf>,
    pub state: Option<TaskState>,
    pub ip_address: Option<String>,
    pub uuid: Option<String>,
}

impl TaskLocation {
    /// Conjunto "desconocido" para tareas sin directorio.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Descompone `<base>/<state>/<ip>/<uuid>`. Nunca falla: los componentes
    /// que no se pueden leer quedan en `None`.
    pub fn from_task_dir(task_dir: &Path) -> Self {
        let name_of = |p: Option<&Path>| {
            p.and_then(|p| p.file_name())
                .map(|s| s.to_string_lossy().to_string())
                .filter(|s| !s.is_empty())
        };

        let ip_dir = task_dir.parent();
        let state_dir = ip_dir.and_then(|p| p.parent());

        Self {
            base_dir: state_dir.and_then(|p| p.parent()).map(Path::to_path_buf),
            state: name_of(state_dir).and_then(|s| TaskState::from_dir_name(&s)),
            ip_address: name_of(ip_dir),
            uuid: name_of(Some(task_dir)),
        }
    }

    /// Ruta de esta misma tarea en otro estado, si la ubicación está completa.
    pub fn path_in(&self, state: TaskState) -> Option<PathBuf> {
        match (&self.base_dir, &self.ip_address, &self.uuid) {
            (Some(base), Some(ip), Some(uuid)) => Some(state_path(base, state, ip, uuid)),
            _ => None,
        }
    }
}

impl fmt::Display for TaskLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_none = |s: Option<String>| s.unwrap_or_else(|| "None".to_string());
        write!(
            f,
            "uuid={} ip={} state={} basedir={}",
            or_none(self.uuid.clone()),
            or_none(self.ip_address.clone()),
            or_none(self.state.map(|s| s.to_string())),
            or_none(self.base_dir.as_ref().map(|p| p.display().to_string())),
        )
    }
}

/// Mueve el directorio de una tarea creando los directorios intermedios.
///
/// Es un único `rename` atómico cuando origen y destino están en el mismo
/// sistema de archivos. Entre dispositivos se copia y luego se borra el
/// origen; esa ventana no es atómica.
pub fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            warn!(
                "{} y {} están en dispositivos distintos, copiando (no atómico)",
                src.display(),
                dst.display()
            );
            copy_tree(src, dst)?;
            fs::remove_dir_all(src).map_err(|e| TaskError::io(src, e))
        }
        Err(e) => Err(TaskError::io(src, e)),
    }
}

fn is_cross_device(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::CrossesDevices
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            TaskError::io(path, io::Error::from(e))
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| TaskError::io(&target, e))?;
        } else {
            debug!("copiando {} -> {}", entry.path().display(), target.display());
            fs::copy(entry.path(), &target).map_err(|e| TaskError::io(&target, e))?;
        }
    }
    Ok(())
}
