use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tabla ordenada que se escribe en `result.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Etiquetas de las columnas.
    pub columns: Vec<String>,
    /// Clave de fila -> resto de valores, en el orden del ranking.
    pub rows: IndexMap<String, Vec<Value>>,
}

impl TaskResult {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: IndexMap::new(),
        }
    }

    pub fn push_row(&mut self, key: impl Into<String>, values: Vec<Value>) {
        self.rows.insert(key.into(), values);
    }
}
