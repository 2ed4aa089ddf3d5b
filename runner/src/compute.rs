use std::{
    io::Write,
    path::PathBuf,
    process::{Command, Stdio},
};

use anyhow::{anyhow, bail, Context, Result};
use common::{Graph, TaskDescriptor, TaskResult};
use tracing::{debug, info};

/// Cómputo de dominio sobre una tarea ya hidratada. Puede tardar mucho; el
/// runner lo llama desde un hilo de bloqueo.
pub trait ComputeEngine: Send + Sync {
    fn run(&self, task: &TaskDescriptor, graph: &Graph) -> Result<TaskResult>;
}

/// Ejecuta un comando externo por tarea.
///
/// - argumento: directorio de la tarea
/// - stdin: la red en JSON
/// - env: parámetros de la tarea (`TASK_*`)
/// - stdout: el resultado en JSON
pub struct CommandEngine {
    program: PathBuf,
    protein_coding_dir: Option<PathBuf>,
    protein_coding_suffix: Option<String>,
}

impl CommandEngine {
    pub fn new(
        program: PathBuf,
        protein_coding_dir: Option<PathBuf>,
        protein_coding_suffix: Option<String>,
    ) -> Self {
        Self {
            program,
            protein_coding_dir,
            protein_coding_suffix,
        }
    }

    fn build_command(&self, task: &TaskDescriptor) -> Result<Command> {
        let dir = task
            .dir()
            .ok_or_else(|| anyhow!("la tarea no tiene directorio"))?;
        let p = &task.params;

        let mut cmd = Command::new(&self.program);
        cmd.arg(dir)
            .current_dir(dir)
            .env("TASK_ALPHA", p.alpha().to_string())
            .env("TASK_WINDOW", p.window().to_string())
            .env("TASK_SNP_CHROM_COL", p.snp_chromosome_label())
            .env("TASK_SNP_BP_COL", p.snp_basepair_label())
            .env("TASK_SNP_PVAL_COL", p.snp_pvalue_label())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(snp) = task.snp_level_summary_file() {
            cmd.env("TASK_SNP_FILE", snp);
        }
        let pc = task.protein_coding_file(
            self.protein_coding_dir.as_deref(),
            self.protein_coding_suffix.as_deref(),
        );
        if let Some(pc) = pc {
            cmd.env("TASK_PROTEIN_CODING_FILE", pc);
        }
        Ok(cmd)
    }
}

impl ComputeEngine for CommandEngine {
    fn run(&self, task: &TaskDescriptor, graph: &Graph) -> Result<TaskResult> {
        let mut cmd = self.build_command(task)?;
        info!("ejecutando {} para {}", self.program.display(), task.summary());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("no se pudo lanzar '{}'", self.program.display()))?;

        let input = serde_json::to_vec(graph)?;
        // stdin en otro hilo para no bloquearnos si el hijo llena stdout primero
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let output = child.wait_with_output()?;
        if let Some(Ok(Err(e))) = writer.map(|w| w.join()) {
            debug!("el comando no leyó toda la red: {}", e);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            bail!(
                "exit code {}: {}",
                code,
                if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() }
            );
        }

        serde_json::from_str(&stdout).context("la salida del comando no es un resultado válido")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use common::{state_path, TaskParams, TaskState};
    use std::{fs, os::unix::fs::PermissionsExt, path::Path};

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("engine.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn task_in(root: &Path, params: TaskParams) -> TaskDescriptor {
        let dir = state_path(root, TaskState::Processing, "ip", "u1");
        fs::create_dir_all(&dir).unwrap();
        TaskDescriptor::new(Some(dir), params)
    }

    #[test]
    fn run_parsea_el_resultado_del_comando() {
        let tmp = tempfile::tempdir().unwrap();
        let prog = script(
            tmp.path(),
            r#"cat > /dev/null
echo '{"columns":["gene","score"],"rows":{"g1":[0.9]}}'"#,
        );
        let engine = CommandEngine::new(prog, None, None);
        let task = task_in(tmp.path(), TaskParams::default());

        let res = engine.run(&task, &Graph::default()).unwrap();
        assert_eq!(res.columns, vec!["gene", "score"]);
        assert_eq!(res.rows["g1"], vec![serde_json::json!(0.9)]);
    }

    #[test]
    fn run_exporta_parametros_y_recibe_la_red() {
        let tmp = tempfile::tempdir().unwrap();
        let prog = script(
            tmp.path(),
            r#"n=$(wc -c)
printf '{"columns":["k","v"],"rows":{"alpha":["%s"],"window":["%s"],"bytes":[%s]}}' "$TASK_ALPHA" "$TASK_WINDOW" "$n""#,
        );
        let engine = CommandEngine::new(prog, None, None);
        let params: TaskParams =
            serde_json::from_value(serde_json::json!({"alpha": 0.3, "window": "50"})).unwrap();
        let task = task_in(tmp.path(), params);
        let graph = Graph {
            nodes: vec!["a".into()],
            edges: vec![],
        };

        let res = engine.run(&task, &graph).unwrap();
        assert_eq!(res.rows["alpha"], vec![serde_json::json!("0.3")]);
        assert_eq!(res.rows["window"], vec![serde_json::json!("50")]);
        let sent = serde_json::to_vec(&graph).unwrap().len() as u64;
        assert_eq!(res.rows["bytes"][0].as_u64(), Some(sent));
    }

    #[test]
    fn run_con_exit_code_distinto_de_cero_es_error() {
        let tmp = tempfile::tempdir().unwrap();
        let prog = script(tmp.path(), "echo boom >&2\nexit 3");
        let engine = CommandEngine::new(prog, None, None);
        let task = task_in(tmp.path(), TaskParams::default());

        let err = engine.run(&task, &Graph::default()).unwrap_err().to_string();
        assert!(err.contains("exit code 3"), "{}", err);
        assert!(err.contains("boom"), "{}", err);
    }

    #[test]
    fn run_con_salida_invalida_es_error() {
        let tmp = tempfile::tempdir().unwrap();
        let prog = script(tmp.path(), "echo hola");
        let engine = CommandEngine::new(prog, None, None);
        let task = task_in(tmp.path(), TaskParams::default());
        assert!(engine.run(&task, &Graph::default()).is_err());
    }

    #[test]
    fn run_sin_directorio_es_error() {
        let engine = CommandEngine::new(PathBuf::from("/bin/true"), None, None);
        assert!(engine.run(&TaskDescriptor::default(), &Graph::default()).is_err());
    }
}
