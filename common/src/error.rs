use std::{io, path::PathBuf};

use thiserror::Error;

/// Errores de las operaciones sobre el árbol de tareas.
///
/// Los llamadores distinguen "no existe" (`Missing`, esperado), "corrupto"
/// (`Json`, se registra en el log) y fallas de I/O (`Io`, se propagan).
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("la tarea no tiene directorio asignado")]
    NoDirectory,

    #[error("{} no existe o no es un directorio", .0.display())]
    NotADirectory(PathBuf),

    #[error("no se puede extraer estado/base de la ruta {}", .0.display())]
    BadLocation(PathBuf),

    #[error("no existe {}", .0.display())]
    Missing(PathBuf),

    #[error("error de I/O en {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON inválido en {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("red inválida: {0}")]
    Network(String),
}

impl TaskError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            TaskError::Missing(path)
        } else {
            TaskError::Io { path, source }
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, TaskError::Missing(_))
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// Limpieza "fire-and-forget": registra el error y lo descarta.
pub fn log_if_err<T, E: std::fmt::Display>(what: &str, res: std::result::Result<T, E>) {
    if let Err(e) = res {
        tracing::warn!("{} falló (se ignora): {}", what, e);
    }
}
