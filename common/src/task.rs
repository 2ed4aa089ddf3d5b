use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, error, info, warn};

use crate::error::{log_if_err, Result, TaskError};
use crate::graph::Graph;
use crate::params::TaskParams;
use crate::results::TaskResult;
use crate::state::{move_dir, TaskLocation, TaskState};

pub const DESCRIPTOR_FILE: &str = "descriptor.json";
pub const RESULT_FILE: &str = "result.json";
/// Archivo grande de entrada; se borra al terminar la tarea.
pub const SNP_LEVEL_SUMMARY_FILE: &str = "snp_level_summary";
pub const PROTEIN_CODING_FILE: &str = "protein_coding";

/// Únicos archivos que se borran al eliminar una tarea.
pub const TASK_FILES: [&str; 3] = [RESULT_FILE, SNP_LEVEL_SUMMARY_FILE, DESCRIPTOR_FILE];

pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Una tarea en el árbol de directorios.
///
/// El estado no es un campo: se deriva de la ruta de `dir`
/// (`<base>/<state>/<ip>/<uuid>`).
#[derive(Debug, Clone, Default)]
pub struct TaskDescriptor {
    dir: Option<PathBuf>,
    pub params: TaskParams,
    result: Option<TaskResult>,
    /// Sólo en memoria, nunca se persiste.
    graph: Option<Arc<Graph>>,
}

/// Lee y parsea `descriptor.json` de un directorio de tarea.
pub fn read_params(task_dir: &Path) -> Result<TaskParams> {
    let path = task_dir.join(DESCRIPTOR_FILE);
    let raw = fs::read(&path).map_err(|e| TaskError::io(&path, e))?;
    serde_json::from_slice(&raw).map_err(|source| TaskError::Json { path, source })
}

impl TaskDescriptor {
    pub fn new(dir: Option<PathBuf>, params: TaskParams) -> Self {
        Self {
            dir,
            params,
            result: None,
            graph: None,
        }
    }

    /// Carga la tarea guardada en `task_dir`.
    pub fn load(task_dir: &Path) -> Result<Self> {
        let params = read_params(task_dir)?;
        Ok(Self::new(Some(task_dir.to_path_buf()), params))
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn set_dir(&mut self, dir: Option<PathBuf>) {
        self.dir = dir;
    }

    pub fn location(&self) -> TaskLocation {
        match &self.dir {
            Some(dir) => TaskLocation::from_task_dir(dir),
            None => TaskLocation::unknown(),
        }
    }

    pub fn uuid(&self) -> Option<String> {
        self.location().uuid
    }

    pub fn ip_address(&self) -> Option<String> {
        self.location().ip_address
    }

    pub fn state(&self) -> Option<TaskState> {
        self.location().state
    }

    /// Resumen de una línea para los logs.
    pub fn summary(&self) -> String {
        self.location().to_string()
    }

    /// Marca la versión que procesó la tarea. Sin argumento usa la del crate.
    pub fn set_version(&mut self, version: Option<&str>) {
        let v = version.unwrap_or(crate::VERSION);
        self.params.version = Some(v.to_string());
    }

    pub fn error_message(&self) -> Option<&str> {
        self.params.error.as_deref()
    }

    pub fn set_error_message(&mut self, msg: impl Into<String>) {
        self.params.error = Some(msg.into());
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Option<TaskResult>) {
        self.result = result;
    }

    pub fn graph(&self) -> Option<&Arc<Graph>> {
        self.graph.as_ref()
    }

    pub fn set_graph(&mut self, graph: Option<Graph>) {
        self.graph = graph.map(Arc::new);
    }

    fn existing_dir(&self) -> Result<&Path> {
        let dir = self.dir.as_deref().ok_or(TaskError::NoDirectory)?;
        if !dir.is_dir() {
            return Err(TaskError::NotADirectory(dir.to_path_buf()));
        }
        Ok(dir)
    }

    /// Reescribe `descriptor.json` y, si hay resultado, `result.json`.
    /// Falla si el directorio ya no existe (por ejemplo, borrado en paralelo).
    pub fn save(&self) -> Result<()> {
        let dir = self.existing_dir()?;

        let desc = dir.join(DESCRIPTOR_FILE);
        debug!("escribiendo datos de la tarea en {}", desc.display());
        write_json(&desc, &self.params)?;

        if let Some(result) = &self.result {
            let res = dir.join(RESULT_FILE);
            debug!("escribiendo resultado en {}", res.display());
            write_json(&res, result)?;
        }
        Ok(())
    }

    /// Cambia el estado moviendo el directorio de la tarea.
    ///
    /// - mismo estado: no hace nada.
    /// - `TaskState::Error`: guarda el mensaje en el descriptor antes de
    ///   mover y la tarea termina en `done`, aunque el guardado falle.
    /// - `delete_temp_files`: borra el archivo SNP después de mover.
    pub fn move_task(
        &mut self,
        new_state: TaskState,
        error_message: Option<&str>,
        delete_temp_files: bool,
    ) -> Result<()> {
        let current = self.dir.clone().ok_or(TaskError::NoDirectory)?;
        let loc = TaskLocation::from_task_dir(&current);
        if loc.base_dir.is_none() {
            return Err(TaskError::BadLocation(current));
        }

        if new_state != TaskState::Error && loc.state == Some(new_state) {
            debug!("se intentó mover la tarea al mismo estado: {}", current.display());
            return Ok(());
        }

        let mut saved = Ok(());
        if new_state == TaskState::Error {
            let emsg = error_message.unwrap_or(UNKNOWN_ERROR);
            info!("tarea marcada con error: {}", emsg);
            self.set_error_message(emsg);
            saved = self.save();
        }

        let target = new_state.resolved();
        if loc.state == Some(target) {
            debug!("la tarea ya está en {}: {}", target, current.display());
            return saved;
        }
        // sin descriptor guardado igual se mueve: la tarea no puede quedar
        // fuera de done
        log_if_err("guardar el mensaje de error", saved);

        let dest = loc
            .path_in(target)
            .ok_or_else(|| TaskError::BadLocation(current.clone()))?;
        debug!(
            "cambiando tarea {} a estado {}",
            loc.uuid.as_deref().unwrap_or("?"),
            target
        );
        move_dir(&current, &dest)?;
        self.dir = Some(dest);

        if delete_temp_files {
            self.delete_temp_files();
        }
        Ok(())
    }

    fn delete_temp_files(&self) {
        if let Some(snp) = self.snp_level_summary_file() {
            debug!("borrando {}", snp.display());
            log_if_err("borrar archivo temporal", fs::remove_file(&snp));
        }
    }

    /// Borra los archivos conocidos de la tarea y luego su directorio.
    ///
    /// Los archivos que no están en `TASK_FILES` no se tocan: se reportan y,
    /// como el directorio queda no vacío, la operación devuelve error.
    pub fn delete_files(&self) -> Result<()> {
        let dir = self.existing_dir()?;

        let entries = fs::read_dir(dir).map_err(|e| TaskError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| TaskError::io(dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !TASK_FILES.contains(&name.as_str()) {
                error!("{} no es un archivo creado por la tarea", name);
                continue;
            }
            let path = entry.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| TaskError::io(&path, e))?;
            }
        }
        fs::remove_dir(dir).map_err(|e| TaskError::io(dir, e))
    }

    /// Archivo SNP de la tarea, si existe.
    pub fn snp_level_summary_file(&self) -> Option<PathBuf> {
        let f = self.dir.as_ref()?.join(SNP_LEVEL_SUMMARY_FILE);
        f.is_file().then_some(f)
    }

    /// Busca primero un archivo `protein_coding` dentro de la tarea y si no,
    /// `<dataset_dir>/<protein_coding><suffix>`.
    pub fn protein_coding_file(
        &self,
        dataset_dir: Option<&Path>,
        suffix: Option<&str>,
    ) -> Option<PathBuf> {
        let in_task = self.dir.as_ref()?.join(PROTEIN_CODING_FILE);
        debug!("buscando protein coding en la tarea: {}", in_task.display());
        if in_task.is_file() {
            return Some(in_task);
        }

        let Some(dataset_dir) = dataset_dir else {
            warn!("directorio de protein coding no configurado");
            return None;
        };
        let Some(p_code) = self.params.protein_coding() else {
            warn!("la tarea no tiene parámetro protein_coding");
            return None;
        };

        let file = dataset_dir.join(format!("{}{}", p_code, suffix.unwrap_or("")));
        debug!("buscando protein coding: {}", file.display());
        file.is_file().then_some(file)
    }

    /// Lee `result.json` si existe.
    pub fn load_result(&self) -> Result<Option<TaskResult>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let path = dir.join(RESULT_FILE);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TaskError::io(&path, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| TaskError::Json { path, source })
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_vec(value).map_err(|source| TaskError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, raw).map_err(|e| TaskError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_path;
    use serde_json::{json, Value};

    fn make_task(base: &Path, state: TaskState, uuid: &str, desc: &str) -> TaskDescriptor {
        let dir = state_path(base, state, "10.0.0.1", uuid);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), desc).unwrap();
        TaskDescriptor::load(&dir).unwrap()
    }

    fn read_json(p: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(p).unwrap()).unwrap()
    }

    #[test]
    fn sin_directorio_devuelve_ubicacion_desconocida() {
        let t = TaskDescriptor::default();
        assert_eq!(t.location(), TaskLocation::unknown());
        assert_eq!(t.uuid(), None);
        assert_eq!(t.state(), None);
        assert!(t.snp_level_summary_file().is_none());
        assert!(t.protein_coding_file(None, None).is_none());
        assert!(matches!(t.save(), Err(TaskError::NoDirectory)));
        assert!(matches!(t.delete_files(), Err(TaskError::NoDirectory)));
        assert_eq!(t.summary(), "uuid=None ip=None state=None basedir=None");
    }

    #[test]
    fn set_version_usa_default_o_el_valor_dado() {
        let mut t = TaskDescriptor::default();
        t.set_version(None);
        assert_eq!(t.params.version.as_deref(), Some(crate::VERSION));
        t.set_version(Some("1.2"));
        assert_eq!(t.params.version.as_deref(), Some("1.2"));
    }

    #[test]
    fn save_escribe_descriptor_y_resultado() {
        let tmp = tempfile::tempdir().unwrap();
        let mut t = make_task(tmp.path(), TaskState::Processing, "u1", r#"{"alpha":"optimal"}"#);
        t.set_version(Some("0.1"));
        let mut r = TaskResult::new(vec!["gene".into(), "score".into()]);
        r.push_row("g1", vec![json!(0.9)]);
        t.set_result(Some(r.clone()));
        t.save().unwrap();

        let dir = t.dir().unwrap();
        assert_eq!(
            read_json(&dir.join(DESCRIPTOR_FILE)),
            json!({"alpha": "optimal", "version": "0.1"})
        );
        assert_eq!(t.load_result().unwrap(), Some(r));
    }

    #[test]
    fn save_falla_si_el_directorio_desaparece() {
        let tmp = tempfile::tempdir().unwrap();
        let t = make_task(tmp.path(), TaskState::Processing, "u1", "{}");
        fs::remove_dir_all(t.dir().unwrap()).unwrap();
        assert!(matches!(t.save(), Err(TaskError::NotADirectory(_))));
    }

    #[test]
    fn move_task_cambia_de_directorio() {
        let tmp = tempfile::tempdir().unwrap();
        let mut t = make_task(tmp.path(), TaskState::Submitted, "u1", r#"{"ndex":"n1"}"#);
        let old = t.dir().unwrap().to_path_buf();

        t.move_task(TaskState::Processing, None, false).unwrap();

        let new = state_path(tmp.path(), TaskState::Processing, "10.0.0.1", "u1");
        assert!(!old.exists());
        assert_eq!(t.dir(), Some(new.as_path()));
        assert_eq!(t.state(), Some(TaskState::Processing));
        assert_eq!(read_json(&new.join(DESCRIPTOR_FILE)), json!({"ndex": "n1"}));
    }

    #[test]
    fn move_task_al_mismo_estado_no_hace_nada() {
        let tmp = tempfile::tempdir().unwrap();
        let mut t = make_task(tmp.path(), TaskState::Processing, "u1", "{}");
        let before = t.dir().unwrap().to_path_buf();
        t.move_task(TaskState::Processing, None, false).unwrap();
        assert_eq!(t.dir(), Some(before.as_path()));
        assert!(before.is_dir());
    }

    #[test]
    fn move_task_a_error_guarda_mensaje_y_termina_en_done() {
        let tmp = tempfile::tempdir().unwrap();
        let mut t = make_task(tmp.path(), TaskState::Processing, "u1", "{}");
        t.move_task(TaskState::Error, Some("falló"), false).unwrap();

        let done = state_path(tmp.path(), TaskState::Done, "10.0.0.1", "u1");
        assert_eq!(t.state(), Some(TaskState::Done));
        assert_eq!(read_json(&done.join(DESCRIPTOR_FILE)), json!({"error": "falló"}));
        assert!(!state_path(tmp.path(), TaskState::Processing, "10.0.0.1", "u1").exists());
    }

    #[test]
    fn move_task_a_error_mueve_aunque_no_pueda_guardar() {
        let tmp = tempfile::tempdir().unwrap();
        let mut t = make_task(tmp.path(), TaskState::Processing, "u1", "{}");
        let desc = t.dir().unwrap().join(DESCRIPTOR_FILE);
        fs::remove_file(&desc).unwrap();
        fs::create_dir(&desc).unwrap();

        t.move_task(TaskState::Error, Some("falló"), false).unwrap();

        assert_eq!(t.state(), Some(TaskState::Done));
        assert!(state_path(tmp.path(), TaskState::Done, "10.0.0.1", "u1").is_dir());
        assert!(!state_path(tmp.path(), TaskState::Processing, "10.0.0.1", "u1").exists());
    }

    #[test]
    fn move_task_a_error_en_done_devuelve_el_error_de_guardado() {
        let tmp = tempfile::tempdir().unwrap();
        let mut t = make_task(tmp.path(), TaskState::Done, "u1", "{}");
        let desc = t.dir().unwrap().join(DESCRIPTOR_FILE);
        fs::remove_file(&desc).unwrap();
        fs::create_dir(&desc).unwrap();

        assert!(t.move_task(TaskState::Error, Some("falló"), false).is_err());
        assert_eq!(t.state(), Some(TaskState::Done));
    }

    #[test]
    fn move_task_a_error_sin_mensaje_usa_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let mut t = make_task(tmp.path(), TaskState::Submitted, "u1", "{}");
        t.move_task(TaskState::Error, None, false).unwrap();
        assert_eq!(t.error_message(), Some(UNKNOWN_ERROR));
        assert_eq!(t.state(), Some(TaskState::Done));
    }

    #[test]
    fn move_task_sin_directorio_es_error() {
        let mut t = TaskDescriptor::default();
        assert!(matches!(
            t.move_task(TaskState::Done, None, false),
            Err(TaskError::NoDirectory)
        ));
    }

    #[test]
    fn move_task_borra_archivos_temporales() {
        let tmp = tempfile::tempdir().unwrap();
        let mut t = make_task(tmp.path(), TaskState::Processing, "u1", "{}");
        fs::write(t.dir().unwrap().join(SNP_LEVEL_SUMMARY_FILE), "a b c").unwrap();
        assert!(t.snp_level_summary_file().is_some());

        t.move_task(TaskState::Done, None, true).unwrap();
        assert!(t.snp_level_summary_file().is_none());
        assert!(t.dir().unwrap().join(DESCRIPTOR_FILE).is_file());
    }

    #[test]
    fn delete_files_borra_la_tarea() {
        let tmp = tempfile::tempdir().unwrap();
        let t = make_task(tmp.path(), TaskState::Done, "u1", "{}");
        let dir = t.dir().unwrap().to_path_buf();
        fs::write(dir.join(RESULT_FILE), "{}").unwrap();
        fs::write(dir.join(SNP_LEVEL_SUMMARY_FILE), "x").unwrap();

        t.delete_files().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn delete_files_no_borra_archivos_ajenos() {
        let tmp = tempfile::tempdir().unwrap();
        let t = make_task(tmp.path(), TaskState::Done, "u1", "{}");
        let dir = t.dir().unwrap().to_path_buf();
        fs::write(dir.join("ajeno.txt"), "no tocar").unwrap();

        assert!(t.delete_files().is_err());
        assert!(dir.join("ajeno.txt").is_file());
        assert!(!dir.join(DESCRIPTOR_FILE).exists());
    }

    #[test]
    fn delete_files_directorio_inexistente() {
        let t = TaskDescriptor::new(Some(PathBuf::from("/no/existe/ip/u")), TaskParams::default());
        assert!(matches!(t.delete_files(), Err(TaskError::NotADirectory(_))));
    }

    #[test]
    fn protein_coding_file_prefiere_el_de_la_tarea() {
        let tmp = tempfile::tempdir().unwrap();
        let t = make_task(tmp.path(), TaskState::Processing, "u1", r#"{"protein_coding":"hg19"}"#);
        let datasets = tmp.path().join("pc");
        fs::create_dir_all(&datasets).unwrap();
        fs::write(datasets.join("hg19.txt"), "").unwrap();

        assert_eq!(
            t.protein_coding_file(Some(&datasets), Some(".txt")),
            Some(datasets.join("hg19.txt"))
        );
        assert_eq!(t.protein_coding_file(Some(&datasets), None), None);
        assert_eq!(t.protein_coding_file(None, Some(".txt")), None);

        let local = t.dir().unwrap().join(PROTEIN_CODING_FILE);
        fs::write(&local, "").unwrap();
        assert_eq!(t.protein_coding_file(Some(&datasets), Some(".txt")), Some(local));
    }

    #[test]
    fn load_con_json_invalido_es_error_json() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("submitted/ip/u");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), "{ no es json").unwrap();
        assert!(matches!(TaskDescriptor::load(&dir), Err(TaskError::Json { .. })));

        let vacio = tmp.path().join("submitted/ip/v");
        fs::create_dir_all(&vacio).unwrap();
        assert!(TaskDescriptor::load(&vacio).unwrap_err().is_missing());
    }
}
