//! Side-channel artifacts: YAML files the model writes under the run
//! directory as its real output.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::error::{Error, ErrorKind, Result, ResultExt};

/// `<run_dir>/<id>-<stage>.yaml`
pub fn artifact_path(run_dir: &Path, id: &str, stage: &str) -> PathBuf {
    run_dir.join(format!("{id}-{stage}.yaml"))
}

/// Read and parse a side-channel file.
pub fn load(path: &Path) -> Result<Value> {
    if !path.is_file() {
        return Err(Error::parse(format!(
            "side-channel file not written: {}",
            path.display()
        )));
    }
    let data = std::fs::read_to_string(path)
        .or_kind(ErrorKind::Parse, || format!("read {}", path.display()))?;
    parse_document(&data).map_err(|e| e.context(format!("parse {}", path.display())))
}

pub fn parse_document(data: &str) -> Result<Value> {
    serde_yaml::from_str(data).or_kind(ErrorKind::Parse, || "invalid YAML".to_string())
}

/// Whether `doc` carries a non-null top-level `key`.
pub fn has_key(doc: &Value, key: &str) -> bool {
    doc.get(key).is_some_and(|v| !v.is_null())
}

/// Deserialize the top-level `key` of `doc`.
pub fn extract<O: DeserializeOwned>(doc: &Value, key: &str) -> Result<O> {
    let value = doc
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::parse(format!("missing top-level key '{key}'")))?;
    serde_yaml::from_value(value.clone())
        .or_kind(ErrorKind::Parse, || format!("decode '{key}'"))
}

/// `load` + `extract` in one step.
pub fn read_key<O: DeserializeOwned>(path: &Path, key: &str) -> Result<O> {
    let doc = load(path)?;
    extract(&doc, key).map_err(|e| e.context(format!("{}", path.display())))
}
