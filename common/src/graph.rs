use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TaskError};

/// Red hidratada desde NDEx. Sólo vive en memoria mientras se procesa la tarea.
///
/// Los nodos se identifican por su nombre (atributo `n` en CX), no por el
/// `@id` numérico del documento.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

impl Graph {
    /// Construye la red a partir de un documento CX (lista de aspectos).
    /// Un aspecto puede venir repartido en varios fragmentos.
    pub fn from_cx(cx: &Value) -> Result<Graph> {
        let aspects = cx
            .as_array()
            .ok_or_else(|| TaskError::Network("CX no es una lista de aspectos".into()))?;

        let mut names: HashMap<i64, String> = HashMap::new();
        let mut graph = Graph::default();
        let mut raw_edges: Vec<(i64, i64)> = Vec::new();

        for fragment in aspects {
            if let Some(nodes) = fragment.get("nodes").and_then(Value::as_array) {
                for node in nodes {
                    let id = node
                        .get("@id")
                        .and_then(Value::as_i64)
                        .ok_or_else(|| TaskError::Network("nodo sin @id".into()))?;
                    let name = node
                        .get("n")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| id.to_string());
                    graph.nodes.push(name.clone());
                    names.insert(id, name);
                }
            }
            if let Some(edges) = fragment.get("edges").and_then(Value::as_array) {
                for edge in edges {
                    let s = edge.get("s").and_then(Value::as_i64);
                    let t = edge.get("t").and_then(Value::as_i64);
                    match (s, t) {
                        (Some(s), Some(t)) => raw_edges.push((s, t)),
                        _ => return Err(TaskError::Network("arista sin s/t".into())),
                    }
                }
            }
        }

        // las aristas pueden llegar antes que los nodos
        for (s, t) in raw_edges {
            let lookup = |id: i64| {
                names
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| TaskError::Network(format!("arista apunta a nodo inexistente {}", id)))
            };
            graph.edges.push((lookup(s)?, lookup(t)?));
        }

        Ok(graph)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
