//! Crash-safe file replacement.
//!
//! Writers stage content in a uniquely named sibling file, fsync it, then
//! `rename()` it over the target. Readers therefore see either the previous
//! record or the new one, never a torn write. Two processes replacing the same
//! file at once each use their own staging file, so the last rename wins
//! cleanly.
//!
//! A crash between staging and rename can leave a `.<name>.<uuid>.tmp` file
//! behind; the file store's maintenance pass removes those.

use crate::error::{LeaseError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix carried by staging files.
pub const STAGING_SUFFIX: &str = ".tmp";

/// Atomically replace `path` with `content`, creating parent directories.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            LeaseError::Backend(format!(
                "failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let staging = staging_path(path)?;
    write_and_sync(&staging, content)?;

    if let Err(e) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(LeaseError::Backend(format!(
            "failed to replace '{}': {}",
            path.display(),
            e
        )));
    }

    #[cfg(unix)]
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Read a file, mapping "not found" to `None`.
pub fn read_optional<P: AsRef<Path>>(path: P) -> Result<Option<String>> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LeaseError::Backend(format!(
            "failed to read '{}': {}",
            path.display(),
            e
        ))),
    }
}

/// Whether `name` looks like a staging file left by [`atomic_write`].
pub fn is_staging_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(STAGING_SUFFIX)
}

fn staging_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            LeaseError::Backend(format!("invalid file path '{}'", target.display()))
        })?;

    Ok(parent.join(format!(
        ".{}.{}{}",
        file_name,
        uuid::Uuid::new_v4().simple(),
        STAGING_SUFFIX
    )))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        LeaseError::Backend(format!(
            "failed to create staging file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let written = file.write_all(content).and_then(|()| file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(path);
        return Err(LeaseError::Backend(format!(
            "failed to write staging file '{}': {}",
            path.display(),
            e
        )));
    }
    Ok(())
}
