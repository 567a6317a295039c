use std::path::{Path, PathBuf};

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::io::atomic_write;

/// Versioned YAML snapshots of one entity: `<entity>-<id>-vNN.yaml`.
///
/// Not safe for concurrent writers on the same entity.
#[derive(Debug)]
pub struct VersionStore {
    dir: PathBuf,
    entity: String,
    id: String,
    current: u32,
}

impl VersionStore {
    /// Open the store for `id` in `dir`, resuming after the highest version
    /// already on disk.
    pub fn open(dir: &Path, entity: &str, id: &str) -> Result<Self> {
        let mut store = Self {
            dir: dir.to_path_buf(),
            entity: entity.to_string(),
            id: id.to_string(),
            current: 0,
        };
        store.current = store.scan()?;
        Ok(store)
    }

    /// `story-<id>-vNN.yaml` store.
    pub fn story(dir: &Path, id: &str) -> Result<Self> {
        Self::open(dir, "story", id)
    }

    fn scan(&self) -> Result<u32> {
        if !self.dir.is_dir() {
            return Ok(0);
        }
        let pattern = format!(
            r"^{}-{}-v(\d+)\.yaml$",
            regex::escape(&self.entity),
            regex::escape(&self.id)
        );
        let re = Regex::new(&pattern).or_kind(ErrorKind::Store, || "build version pattern".into())?;
        let entries = std::fs::read_dir(&self.dir)
            .or_kind(ErrorKind::Store, || format!("list {}", self.dir.display()))?;
        Ok(entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                re.captures(&name).and_then(|c| c[1].parse::<u32>().ok())
            })
            .max()
            .unwrap_or(0))
    }

    pub fn path_for(&self, version: u32) -> PathBuf {
        self.dir
            .join(format!("{}-{}-v{version:02}.yaml", self.entity, self.id))
    }

    pub fn current_version(&self) -> u32 {
        self.current
    }

    pub fn latest_path(&self) -> Result<PathBuf> {
        if self.current == 0 {
            return Err(Error::new(
                ErrorKind::Store,
                format!("no saved version of {} {}", self.entity, self.id),
            ));
        }
        Ok(self.path_for(self.current))
    }

    /// Write `v01`.
    pub fn save_initial<T: Serialize>(&mut self, payload: &T) -> Result<PathBuf> {
        if self.current != 0 {
            return Err(Error::new(
                ErrorKind::Store,
                format!(
                    "{} {} already has {} version(s)",
                    self.entity, self.id, self.current
                ),
            ));
        }
        self.write(1, payload)
    }

    /// Write the next version and return its path.
    pub fn save_next<T: Serialize>(&mut self, payload: &T) -> Result<PathBuf> {
        self.write(self.current + 1, payload)
    }

    pub fn load_latest<T: DeserializeOwned>(&self) -> Result<T> {
        let path = self.latest_path()?;
        let data = crate::io::read_to_string(&path)?;
        serde_yaml::from_str(&data)
            .or_kind(ErrorKind::Store, || format!("parse {}", path.display()))
    }

    fn write<T: Serialize>(&mut self, version: u32, payload: &T) -> Result<PathBuf> {
        let path = self.path_for(version);
        let yaml = serde_yaml::to_string(payload)
            .or_kind(ErrorKind::Store, || format!("serialize {}", path.display()))?;
        atomic_write(&path, yaml.as_bytes())?;
        self.current = version;
        tracing::info!(file = %path.display(), version, "version saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        id: String,
        rev: u32,
    }

    fn doc(rev: u32) -> Doc {
        Doc {
            id: "4.1".into(),
            rev,
        }
    }

    #[test]
    fn versions_are_monotonic_without_gaps() {
        let dir = TempDir::new().unwrap();
        let mut store = VersionStore::story(dir.path(), "4.1").unwrap();
        assert!(store.latest_path().is_err());

        store.save_initial(&doc(1)).unwrap();
        for rev in 2..=4 {
            store.save_next(&doc(rev)).unwrap();
        }
        for v in 1..=4 {
            assert!(dir.path().join(format!("story-4.1-v{v:02}.yaml")).is_file());
        }
        assert!(!dir.path().join("story-4.1-v05.yaml").exists());
        assert_eq!(store.current_version(), 4);
        assert_eq!(store.load_latest::<Doc>().unwrap(), doc(4));
        assert!(store.latest_path().unwrap().ends_with("story-4.1-v04.yaml"));
    }

    #[test]
    fn reopen_resumes_counter() {
        let dir = TempDir::new().unwrap();
        let mut store = VersionStore::story(dir.path(), "4.1").unwrap();
        store.save_initial(&doc(1)).unwrap();
        store.save_next(&doc(2)).unwrap();
        std::fs::write(dir.path().join("story-4.10-v07.yaml"), "x").unwrap();

        let mut reopened = VersionStore::story(dir.path(), "4.1").unwrap();
        assert_eq!(reopened.current_version(), 2);
        assert!(reopened.save_initial(&doc(1)).is_err());
        let path = reopened.save_next(&doc(3)).unwrap();
        assert!(path.ends_with("story-4.1-v03.yaml"));
    }
}
