//! Model persistence: a blob store keyed by model name.
//!
//! The kernel treats saved models as opaque documents; [`FileModelStore`]
//! keeps one JSON file per model under a base directory. Overwriting requires
//! the stored name to match exactly, including case, so case-insensitive
//! filesystems cannot silently clobber a differently-cased model.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{KernelError, Result};
use crate::model::ObjectSnapshot;

/// A fully serialized model: every pool object in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedModel {
    pub name: String,
    pub objects: Vec<ObjectSnapshot>,
}

/// Blob store for persisted models.
pub trait ModelStore: Send + Sync {
    fn model_names(&self) -> Result<Vec<String>>;
    fn save(&self, model: &PersistedModel, overwrite: bool) -> Result<()>;
    fn load(&self, name: &str) -> Result<PersistedModel>;
    fn remove(&self, name: &str) -> Result<()>;
}

/// One pretty-printed JSON document per model under `base_dir`.
pub struct FileModelStore {
    base_dir: PathBuf,
}

impl FileModelStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn file_of(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.base_dir.join(format!("{name}.json")))
    }

    /// An existing file name that equals `name` ignoring case, if any.
    fn case_insensitive_match(&self, name: &str) -> Result<Option<String>> {
        if !self.base_dir.exists() {
            return Ok(None);
        }
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = file_name.strip_suffix(".json") {
                if stem.eq_ignore_ascii_case(name) {
                    return Ok(Some(stem.to_string()));
                }
            }
        }
        Ok(None)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '.' || c.is_control())
    {
        return Err(KernelError::IllegalArgument(format!(
            "invalid model name {name:?}"
        )));
    }
    Ok(())
}

impl ModelStore for FileModelStore {
    fn model_names(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = file_name.strip_suffix(".json") {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn save(&self, model: &PersistedModel, overwrite: bool) -> Result<()> {
        let file = self.file_of(&model.name)?;
        if let Some(existing) = self.case_insensitive_match(&model.name)? {
            if existing != model.name {
                return Err(KernelError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("model name {existing:?} differs from {:?} only in case", model.name),
                )));
            }
            if !overwrite {
                return Err(KernelError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("model {existing:?} already exists"),
                )));
            }
        }

        fs::create_dir_all(&self.base_dir)?;
        let json = serde_json::to_string_pretty(model)?;
        fs::write(&file, json)?;
        info!(model = %model.name, objects = model.objects.len(), "model saved");
        Ok(())
    }

    fn load(&self, name: &str) -> Result<PersistedModel> {
        let file = self.file_of(name)?;
        if !file.exists() {
            return Err(KernelError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no model named {name:?}"),
            )));
        }
        let json = fs::read_to_string(&file)?;
        let model: PersistedModel = serde_json::from_str(&json)?;
        info!(model = %name, objects = model.objects.len(), "model loaded");
        Ok(model)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let file = self.file_of(name)?;
        if !file.exists() {
            return Err(KernelError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no model named {name:?}"),
            )));
        }
        fs::remove_file(&file)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transport-order scripts
// ---------------------------------------------------------------------------

/// One destination of a scripted transport order, by location name.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptDestination {
    pub location: String,
    pub operation: String,
}

/// One transport order of a script file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptOrder {
    pub destinations: Vec<ScriptDestination>,
    #[serde(default)]
    pub deadline_ms: Option<i64>,
    #[serde(default)]
    pub intended_vehicle: Option<String>,
    /// When true, this order depends on the previous order in the script.
    #[serde(default)]
    pub depends_on_previous: bool,
}

/// A transport-order script: a JSON document listing orders to create.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderScript {
    pub orders: Vec<ScriptOrder>,
}

/// Loads a script from `dir`, rejecting file names that escape it.
pub fn load_order_script(dir: &Path, file_name: &str) -> Result<OrderScript> {
    if file_name.is_empty()
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name.contains("..")
    {
        return Err(KernelError::IllegalArgument(format!(
            "invalid script file name {file_name:?}"
        )));
    }
    let path = dir.join(file_name);
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Names of the script files in `dir`.
pub fn available_scripts(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectData, ObjectMeta, Point};
    use crate::refs::ObjectId;

    fn sample_model(name: &str) -> PersistedModel {
        PersistedModel {
            name: name.to_string(),
            objects: vec![ObjectSnapshot {
                meta: ObjectMeta::new(ObjectId(0), "Point-0000"),
                data: ObjectData::Point(Point::default()),
            }],
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileModelStore::new(dir.path());

        let model = sample_model("Plant");
        store.save(&model, false).expect("save");
        let loaded = store.load("Plant").expect("load");
        assert_eq!(loaded, model);
        assert_eq!(store.model_names().expect("names"), vec!["Plant"]);
    }

    #[test]
    fn overwrite_requires_flag_and_exact_case() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileModelStore::new(dir.path());

        store.save(&sample_model("Plant"), false).expect("save");
        assert!(matches!(
            store.save(&sample_model("Plant"), false),
            Err(KernelError::Io(_))
        ));
        store.save(&sample_model("Plant"), true).expect("overwrite");
        // A differently-cased name is a conflict even with overwrite set.
        assert!(matches!(
            store.save(&sample_model("plant"), true),
            Err(KernelError::Io(_))
        ));
    }

    #[test]
    fn load_and_remove_missing_models_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileModelStore::new(dir.path());
        assert!(matches!(store.load("Ghost"), Err(KernelError::Io(_))));
        assert!(matches!(store.remove("Ghost"), Err(KernelError::Io(_))));
    }

    #[test]
    fn script_files_are_listed_and_parsed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = r#"{
            "orders": [
                {
                    "destinations": [{"location": "Depot", "operation": "LOAD"}],
                    "deadline_ms": 123,
                    "depends_on_previous": false
                },
                {
                    "destinations": [{"location": "Dock", "operation": "UNLOAD"}],
                    "depends_on_previous": true
                }
            ]
        }"#;
        std::fs::write(dir.path().join("shift-a.json"), script).expect("write");

        assert_eq!(
            available_scripts(dir.path()).expect("scripts"),
            vec!["shift-a.json"]
        );
        let parsed = load_order_script(dir.path(), "shift-a.json").expect("parse");
        assert_eq!(parsed.orders.len(), 2);
        assert_eq!(parsed.orders[0].deadline_ms, Some(123));
        assert!(parsed.orders[1].depends_on_previous);

        assert!(matches!(
            load_order_script(dir.path(), "../escape.json"),
            Err(KernelError::IllegalArgument(_))
        ));
    }
}
