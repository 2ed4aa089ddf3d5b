use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use common::{
    DeletedTaskScanner, DeletionTarget, Graph, SubmittedTaskScanner, TaskDescriptor, TaskError,
    TaskResult, TaskState,
};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::compute::ComputeEngine;
use crate::network::NetworkFetch;

/// Configuración ya resuelta del loop.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub task_root: PathBuf,
    /// Espera cuando no hay tareas en `submitted`.
    pub wait_time: Duration,
    pub delete_enabled: bool,
    /// Borrar el archivo SNP al mover la tarea a `done`.
    pub delete_temp_files: bool,
    /// Se estampa en cada tarea procesada.
    pub version: String,
}

/// Loop principal: atiende borrados, toma una tarea, la ejecuta y la deja
/// en `done` (con resultado o con mensaje de error).
///
/// Una tarea a la vez. Un error de una tarea nunca corta el loop; sólo los
/// errores de I/O de los scanners se propagan.
pub struct TaskRunner {
    config: RunnerConfig,
    submitted: SubmittedTaskScanner,
    deleted: Option<DeletedTaskScanner>,
    network: Arc<dyn NetworkFetch>,
    engine: Arc<dyn ComputeEngine>,
}

impl TaskRunner {
    pub fn new(
        config: RunnerConfig,
        network: Arc<dyn NetworkFetch>,
        engine: Arc<dyn ComputeEngine>,
    ) -> Self {
        let deleted = if config.delete_enabled {
            Some(DeletedTaskScanner::new(&config.task_root))
        } else {
            info!("borrado de tareas deshabilitado");
            None
        };
        Self {
            submitted: SubmittedTaskScanner::new(&config.task_root),
            deleted,
            config,
            network,
            engine,
        }
    }

    pub async fn run_tasks<F>(&mut self, mut keep_looping: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        while keep_looping() {
            // los borrados tienen prioridad sobre las tareas nuevas
            while self.remove_deleted_task()? {}

            let Some(mut task) = self.submitted.next_task()? else {
                sleep(self.config.wait_time).await;
                continue;
            };

            info!("encontré una tarea: {}", task.summary());
            if let Err(e) = self.process_task(&mut task).await {
                let emsg = format!(
                    "Error procesando la tarea {}: {}",
                    task.dir().map(|d| d.display().to_string()).unwrap_or_default(),
                    e
                );
                error!("se salta la tarea: {}", emsg);
                task.set_result(None);
                if let Err(e) = task.move_task(TaskState::Error, Some(&emsg), false) {
                    // puede perderse el registro final de la tarea
                    error!("no se pudo mover la tarea a done: {}", e);
                    if task.state() == Some(TaskState::Submitted) {
                        if let Some(dir) = task.dir() {
                            self.submitted.skip(dir);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// `Ok(false)` cuando no quedan pedidos de borrado.
    fn remove_deleted_task(&mut self) -> Result<bool, TaskError> {
        let Some(scanner) = self.deleted.as_mut() else {
            return Ok(false);
        };

        match scanner.next_deletion_target()? {
            None => Ok(false),
            Some(DeletionTarget::NotFound(_)) => Ok(true),
            Some(DeletionTarget::Task(task)) => {
                info!("borrando tarea: {}", task.summary());
                if let Err(e) = task.delete_files() {
                    error!("error borrando la tarea: {}", e);
                }
                Ok(true)
            }
        }
    }

    async fn process_task(&self, task: &mut TaskDescriptor) -> Result<(), TaskError> {
        // el rename a processing es el que "reclama" la tarea
        match task.move_task(TaskState::Processing, None, false) {
            Ok(()) => {}
            Err(e) if e.is_missing() => {
                warn!("la tarea desapareció antes de procesarla: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let graph = match self.network.fetch(task.params.network_id()).await {
            Ok(graph) => graph,
            Err(e) => {
                let emsg = format!("No se pudo obtener la red de la tarea: {:#}", e);
                error!("{}", emsg);
                return task.move_task(TaskState::Error, Some(&emsg), false);
            }
        };
        task.set_graph(Some(graph));

        match self.run_compute(task).await {
            Ok(result) => task.set_result(Some(result)),
            Err(emsg) => {
                warn!("la tarea terminó con error: {}", emsg);
                task.set_error_message(emsg);
            }
        }

        info!("procesamiento de la tarea terminado");
        task.set_version(Some(&self.config.version));
        task.save()?;
        task.move_task(TaskState::Done, None, self.config.delete_temp_files)
    }

    /// Corre el motor en un hilo de bloqueo; errores y panics vuelven como
    /// mensaje para el descriptor.
    async fn run_compute(&self, task: &TaskDescriptor) -> Result<TaskResult, String> {
        let engine = Arc::clone(&self.engine);
        let snapshot = task.clone();

        let handle = tokio::task::spawn_blocking(move || -> Result<TaskResult> {
            let graph: Arc<Graph> = snapshot
                .graph()
                .cloned()
                .ok_or_else(|| anyhow!("la tarea no tiene red"))?;
            engine.run(&snapshot, &graph)
        });

        match handle.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(e) => Err(format!("panic o join error ejecutando la tarea: {}", e)),
        }
    }
}
