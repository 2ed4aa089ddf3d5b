use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, error, info, warn};

use crate::error::{Result, TaskError};
use crate::state::{state_root, TaskState};
use crate::task::{TaskDescriptor, DESCRIPTOR_FILE};

/// Busca la próxima tarea en `<taskroot>/submitted/<ip>/<uuid>`.
pub struct SubmittedTaskScanner {
    submit_dir: PathBuf,
    /// Tareas con descriptor ilegible, para no loguearlas en cada pasada.
    problems: HashSet<PathBuf>,
    /// Tareas que no se pudieron sacar de `submitted`; no se vuelven a devolver.
    skipped: HashSet<PathBuf>,
}

impl SubmittedTaskScanner {
    pub fn new(task_root: &Path) -> Self {
        Self {
            submit_dir: state_root(task_root, TaskState::Submitted),
            problems: HashSet::new(),
            skipped: HashSet::new(),
        }
    }

    /// Devuelve la primera tarea con descriptor válido, en el orden del listado.
    ///
    /// `Ok(None)` si no hay trabajo o si `submitted` no existe. Los errores de
    /// I/O al listar se propagan.
    pub fn next_task(&mut self) -> Result<Option<TaskDescriptor>> {
        if !self.submit_dir.is_dir() {
            error!(
                "{} no existe o no es un directorio",
                self.submit_dir.display()
            );
            return Ok(None);
        }
        debug!("buscando tareas nuevas en {}", self.submit_dir.display());

        for ip_dir in list_dirs(&self.submit_dir)? {
            for task_dir in list_dirs(&ip_dir)? {
                if self.skipped.contains(&task_dir) {
                    continue;
                }
                // todavía sin descriptor: el productor no terminó de escribir
                if !task_dir.join(DESCRIPTOR_FILE).is_file() {
                    continue;
                }
                match TaskDescriptor::load(&task_dir) {
                    Ok(task) => return Ok(Some(task)),
                    Err(e) if e.is_missing() => continue,
                    Err(e) => {
                        if self.problems.insert(task_dir.clone()) {
                            info!("se salta la tarea {}: {}", task_dir.display(), e);
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    pub fn problem_list(&self) -> &HashSet<PathBuf> {
        &self.problems
    }

    pub fn problem_count(&self) -> usize {
        self.problems.len()
    }

    /// No volver a devolver `task_dir` en este proceso.
    pub fn skip(&mut self, task_dir: &Path) {
        if self.skipped.insert(task_dir.to_path_buf()) {
            warn!("se ignora la tarea {} de aquí en más", task_dir.display());
        }
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Subdirectorios de `dir`. Si `dir` desapareció entre listados devuelve vacío.
pub(crate) fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TaskError::io(dir, e)),
    };

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TaskError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            out.push(path);
        }
    }
    Ok(out)
}
