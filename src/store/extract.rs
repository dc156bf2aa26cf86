//! Safe zip extraction.
//!
//! Every archive entry is resolved against the destination and, after
//! lexical normalization, must keep the canonicalized destination as a
//! strict prefix. This defeats `../` traversal and absolute-path entries.
//! Symlink entries are rejected outright. Partial output from a failed
//! extraction is left on disk; the intake pipeline owns cleanup.

use crate::error::{FuncletError, Result};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// Unpack `archive_path` into `dest`, which must already exist.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let canonical_dest = std::fs::canonicalize(dest)
        .map_err(|e| FuncletError::ExtractIo(format!("resolve {}: {e}", dest.display())))?;

    let file = File::open(archive_path)
        .map_err(|e| FuncletError::ExtractIo(format!("open {}: {e}", archive_path.display())))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| FuncletError::ExtractIo(format!("read {}: {e}", archive_path.display())))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| FuncletError::ExtractIo(format!("entry {index}: {e}")))?;
        let name = entry.name().to_string();
        let mode = entry.unix_mode();

        if let Some(mode) = mode {
            // S_IFLNK: the destination tree must not contain links that
            // could redirect later writes.
            if mode & 0o170_000 == 0o120_000 {
                return Err(FuncletError::IllegalPath(format!(
                    "symlink entry not supported: {name}"
                )));
            }
        }

        let target = resolve_entry_path(&canonical_dest, &name)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| FuncletError::ExtractIo(format!("mkdir {}: {e}", target.display())))?;
            set_mode(&target, mode.unwrap_or(0o755));
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FuncletError::ExtractIo(format!("mkdir {}: {e}", parent.display())))?;
        }
        let mut out = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target)
            .map_err(|e| FuncletError::ExtractIo(format!("create {}: {e}", target.display())))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| FuncletError::ExtractIo(format!("write {}: {e}", target.display())))?;
        set_mode(&target, mode.unwrap_or(0o644));
    }

    debug!(archive = %archive_path.display(), dest = %canonical_dest.display(), "archive extracted");
    Ok(())
}

/// Join `name` onto `dest` and normalize lexically; any result that does
/// not keep `dest` as a strict prefix is a traversal attempt.
fn resolve_entry_path(dest: &Path, name: &str) -> Result<PathBuf> {
    let joined = dest.join(name);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }

    if normalized == dest || !normalized.starts_with(dest) {
        return Err(FuncletError::IllegalPath(format!(
            "archive entry escapes destination: {name}"
        )));
    }
    Ok(normalized)
}

fn set_mode(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777));
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}
