use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use common::Graph;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

/// Obtiene la red asociada a una tarea.
#[async_trait]
pub trait NetworkFetch: Send + Sync {
    /// `network_id` es la clave `ndex` del descriptor. Si la tarea no la trae,
    /// la implementación decide si eso es un error.
    async fn fetch(&self, network_id: Option<&str>) -> Result<Graph>;
}

/// Descarga redes en formato CX desde un servidor NDEx.
pub struct NdexFetcher {
    client: Client,
    base_url: String,
}

impl NdexFetcher {
    /// Acepta "public.ndexbio.org" o una URL completa.
    pub fn new(server: &str) -> Self {
        let server = server.trim_end_matches('/');
        let base_url = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("https://{}", server)
        };
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn network_url(&self, network_id: &str) -> String {
        format!("{}/v2/network/{}", self.base_url, network_id)
    }
}

#[async_trait]
impl NetworkFetch for NdexFetcher {
    async fn fetch(&self, network_id: Option<&str>) -> Result<Graph> {
        let id = network_id.ok_or_else(|| anyhow!("la tarea no tiene id de red (ndex)"))?;
        let url = self.network_url(id);
        info!("descargando red {} desde {}", id, url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("error HTTP al pedir la red {}", id))?;
        if !resp.status().is_success() {
            bail!("NDEx devolvió status {} para la red {}", resp.status(), id);
        }

        let cx: Value = resp
            .json()
            .await
            .with_context(|| format!("la red {} no es JSON", id))?;
        let graph = Graph::from_cx(&cx)?;
        info!(
            "red {} cargada: {} nodos, {} aristas",
            id,
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}
