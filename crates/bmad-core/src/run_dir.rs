use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::error::{ErrorKind, Result, ResultExt};

/// The per-invocation output root `<base>/YYYY-MM-DD-HH-MM`. Never removed
/// by the tool.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create a fresh directory named after `now`. A name already taken by
    /// another invocation gets `-2`, `-3`, … appended.
    pub fn create<Tz: TimeZone>(base: &Path, now: DateTime<Tz>) -> Result<Self>
    where
        Tz::Offset: std::fmt::Display,
    {
        std::fs::create_dir_all(base)
            .or_kind(ErrorKind::Store, || format!("create {}", base.display()))?;
        let stamp = now.format("%Y-%m-%d-%H-%M").to_string();
        let mut attempt = 1u32;
        loop {
            let name = match attempt {
                1 => stamp.clone(),
                n => format!("{stamp}-{n}"),
            };
            let path = base.join(name);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::info!(dir = %path.display(), "run directory created");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(e)
                        .or_kind(ErrorKind::Store, || format!("create {}", path.display()))
                }
            }
        }
    }

    /// Wrap an existing directory (created on demand).
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        crate::io::ensure_dir(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// S0 of every pipeline: the directory may have been removed underneath us.
    pub fn ensure(&self) -> Result<()> {
        crate::io::ensure_dir(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn names_by_minute_and_disambiguates() {
        let base = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 42).unwrap();
        let first = RunDirectory::create(base.path(), now).unwrap();
        let second = RunDirectory::create(base.path(), now).unwrap();
        let third = RunDirectory::create(base.path(), now).unwrap();
        assert!(first.path().ends_with("2026-10-18-09-05"));
        assert!(second.path().ends_with("2026-10-18-09-05-2"));
        assert!(third.path().ends_with("2026-10-18-09-05-3"));
        assert!(first.path().is_dir() && third.path().is_dir());
    }

    #[test]
    fn ensure_recreates_missing_directory() {
        let base = TempDir::new().unwrap();
        let run = RunDirectory::at(base.path().join("run")).unwrap();
        std::fs::remove_dir(run.path()).unwrap();
        run.ensure().unwrap();
        assert!(run.path().is_dir());
    }
}
