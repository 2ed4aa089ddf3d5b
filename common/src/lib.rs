//! Modelo de tareas y protocolo de directorios compartido por el runner y
//! el cliente.
//!
//! ```text
//! <taskroot>/submitted/<ip>/<uuid>/
//! <taskroot>/processing/<ip>/<uuid>/
//! <taskroot>/done/<ip>/<uuid>/
//! <taskroot>/delete_requests/<uuid>
//! ```

pub mod deleted;
pub mod error;
pub mod graph;
pub mod params;
pub mod results;
pub mod scanner;
pub mod state;
pub mod submit;
pub mod task;

pub use deleted::{find_task, DeletedTaskScanner, DeletionTarget};
pub use error::{log_if_err, TaskError};
pub use graph::Graph;
pub use params::{Alpha, TaskParams};
pub use results::TaskResult;
pub use scanner::SubmittedTaskScanner;
pub use state::{state_path, TaskLocation, TaskState};
pub use submit::{list_tasks, request_deletion, submit_task};
pub use task::TaskDescriptor;

/// Versión que se estampa en las tareas si no se indica otra.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
