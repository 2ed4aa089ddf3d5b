use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const OPTIMAL: &str = "optimal";
pub const DEFAULT_WINDOW: u64 = 10_000;

pub const SNP_CHROM_COL: &str = "hg18chr";
pub const SNP_BP_COL: &str = "bp";
pub const SNP_PVAL_COL: &str = "pval";

/// Coeficiente de difusión.
#[derive(Debug, Clone, PartialEq)]
pub enum Alpha {
    /// El motor elige el valor.
    Optimal,
    Value(f64),
}

impl std::fmt::Display for Alpha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alpha::Optimal => f.write_str(OPTIMAL),
            Alpha::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Parámetros de una tarea tal como se guardan en `descriptor.json`.
///
/// Las claves conocidas tienen campo propio; el resto va a `extra` y se
/// vuelve a escribir sin tocar. Las claves de texto aceptan cualquier
/// escalar (`{"ndex": 12345}` queda como `"12345"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    /// Id de la red en NDEx.
    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub ndex: Option<String>,

    /// Número, string numérico u "optimal".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<Value>,

    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub protein_coding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<Value>,

    /// "chrom,bp,pval"
    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub snp_level_summary_col_labels: Option<String>,

    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,

    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `null` es ausente; strings tal cual; cualquier otro valor, su JSON.
fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl TaskParams {
    /// Default: `Alpha::Optimal` (también si la clave es `null` o no se entiende).
    pub fn alpha(&self) -> Alpha {
        match &self.alpha {
            Some(Value::Number(n)) => n.as_f64().map(Alpha::Value).unwrap_or(Alpha::Optimal),
            Some(Value::String(s)) if s != OPTIMAL => {
                s.trim().parse().map(Alpha::Value).unwrap_or(Alpha::Optimal)
            }
            _ => Alpha::Optimal,
        }
    }

    /// Default: `DEFAULT_WINDOW`.
    pub fn window(&self) -> u64 {
        match &self.window {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_WINDOW),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_WINDOW),
            _ => DEFAULT_WINDOW,
        }
    }

    /// Default: `None`.
    pub fn protein_coding(&self) -> Option<&str> {
        self.protein_coding.as_deref()
    }

    pub fn network_id(&self) -> Option<&str> {
        self.ndex.as_deref().filter(|s| !s.is_empty())
    }

    fn col_label(&self, idx: usize) -> Option<&str> {
        self.snp_level_summary_col_labels
            .as_deref()
            .and_then(|s| s.split(',').nth(idx))
    }

    pub fn snp_chromosome_label(&self) -> &str {
        self.col_label(0).unwrap_or(SNP_CHROM_COL)
    }

    pub fn snp_basepair_label(&self) -> &str {
        self.col_label(1).unwrap_or(SNP_BP_COL)
    }

    pub fn snp_pvalue_label(&self) -> &str {
        self.col_label(2).unwrap_or(SNP_PVAL_COL)
    }
}
