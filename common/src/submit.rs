use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::info;
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::params::TaskParams;
use crate::scanner::list_dirs;
use crate::state::{delete_requests_root, state_path, state_root, TaskLocation, TaskState};
use crate::task::{TaskDescriptor, DESCRIPTOR_FILE, SNP_LEVEL_SUMMARY_FILE};

/// Crea una tarea nueva en `submitted/<ip>/<uuid>`.
///
/// El descriptor se escribe al final (nombre temporal + rename) para que el
/// runner nunca vea un descriptor a medio escribir.
pub fn submit_task(
    task_root: &Path,
    ip: &str,
    params: TaskParams,
    snp_file: Option<&Path>,
) -> Result<TaskDescriptor> {
    let uuid = Uuid::new_v4().to_string();
    let dir = state_path(task_root, TaskState::Submitted, ip, &uuid);
    fs::create_dir_all(&dir).map_err(|e| TaskError::io(&dir, e))?;

    if let Some(snp) = snp_file {
        let dest = dir.join(SNP_LEVEL_SUMMARY_FILE);
        fs::copy(snp, &dest).map_err(|e| TaskError::io(snp, e))?;
    }

    let tmp = dir.join(format!("{}.tmp", DESCRIPTOR_FILE));
    let raw = serde_json::to_vec(&params).map_err(|source| TaskError::Json {
        path: tmp.clone(),
        source,
    })?;
    fs::write(&tmp, raw).map_err(|e| TaskError::io(&tmp, e))?;
    let desc = dir.join(DESCRIPTOR_FILE);
    fs::rename(&tmp, &desc).map_err(|e| TaskError::io(&desc, e))?;

    info!("tarea {} enviada desde {}", uuid, ip);
    Ok(TaskDescriptor::new(Some(dir), params))
}

/// Pide el borrado de una tarea creando `delete_requests/<uuid>`.
pub fn request_deletion(task_root: &Path, uuid: &str) -> Result<PathBuf> {
    let dir = delete_requests_root(task_root);
    fs::create_dir_all(&dir).map_err(|e| TaskError::io(&dir, e))?;
    let marker = dir.join(uuid);
    fs::write(&marker, b"").map_err(|e| TaskError::io(&marker, e))?;
    Ok(marker)
}

/// Todas las tareas en submitted, processing y done.
pub fn list_tasks(task_root: &Path) -> Result<Vec<TaskLocation>> {
    let mut out = Vec::new();
    for state in [TaskState::Submitted, TaskState::Processing, TaskState::Done] {
        for ip_dir in list_dirs(&state_root(task_root, state))? {
            for task_dir in list_dirs(&ip_dir)? {
                out.push(TaskLocation::from_task_dir(&task_dir));
            }
        }
    }
    Ok(out)
}
