use crate::error::{ErrorKind, Result, ResultExt};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// The file ends up readable and writable by the owner only.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    ensure_dir(dir)?;
    let ctx = || format!("write {}", path.display());
    let mut tmp = NamedTempFile::new_in(dir).or_kind(ErrorKind::Store, ctx)?;
    tmp.write_all(data).or_kind(ErrorKind::Store, ctx)?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .or_kind(ErrorKind::Store, ctx)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).or_kind(ErrorKind::Store, || {
        format!("create directory {}", path.display())
    })
}

pub fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).or_kind(ErrorKind::Store, || format!("read {}", path.display()))
}

/// Write a diagnostic file. Failures are logged and swallowed.
pub fn write_diagnostic(path: &Path, contents: &str) {
    match std::fs::write(path, contents) {
        Ok(()) => tracing::debug!(file = %path.display(), "diagnostic saved"),
        Err(e) => tracing::warn!(file = %path.display(), error = %e, "failed to save diagnostic"),
    }
}
