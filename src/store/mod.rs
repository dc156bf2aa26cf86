//! Artifact store — on-disk layout and metadata persistence.
//!
//! Every registered function owns one version directory:
//!
//! ```text
//! <base>/<name>/<version>/
//!     main.bin       # native executable (mandatory)
//!     main.wasm      # WASI module (optional)
//!     meta.json      # serialized FunctionRecord, two-space indented
//!     src.zip        # retained when the upload was an archive
//!     <sources>/     # extracted tree, if archive
//! ```
//!
//! All stored paths are absolute so records survive a working-directory
//! change between registration and invocation.

pub mod extract;

use crate::error::{FuncletError, Result};
use crate::function::FunctionRecord;
use crate::registry::META_FILE;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk artifact store rooted at a canonicalized base directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if necessary) a store rooted at `base_dir`.
    pub fn open(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)
            .map_err(|e| FuncletError::StoreIo(format!("create {}: {e}", base_dir.display())))?;
        let base = std::fs::canonicalize(base_dir)
            .map_err(|e| FuncletError::StoreIo(format!("resolve {}: {e}", base_dir.display())))?;
        Ok(Self { base })
    }

    /// The canonical base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of the version directory for `(name, version)`.
    pub fn version_dir(&self, name: &str, version: &str) -> PathBuf {
        self.base.join(name).join(version)
    }

    /// Create the version directory (idempotent, mode 0755) and return its
    /// absolute path.
    pub fn create_version_dir(&self, name: &str, version: &str) -> Result<PathBuf> {
        let dir = self.version_dir(name, version);
        std::fs::create_dir_all(&dir)
            .map_err(|e| FuncletError::StoreIo(format!("create {}: {e}", dir.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| FuncletError::StoreIo(format!("chmod {}: {e}", dir.display())))?;
        }
        Ok(dir)
    }

    /// Serialize `record` to `meta.json` in its version directory.
    ///
    /// Written via a temporary file and renamed into place so a crash never
    /// leaves a half-written metadata file behind.
    pub fn persist_meta(&self, record: &FunctionRecord) -> Result<()> {
        let dir = self.version_dir(&record.name, &record.version);
        let meta_path = dir.join(META_FILE);
        let tmp_path = dir.join(format!("{META_FILE}.tmp"));

        let data = serde_json::to_vec_pretty(record)?;
        std::fs::write(&tmp_path, data)
            .map_err(|e| FuncletError::StoreIo(format!("write {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, &meta_path)
            .map_err(|e| FuncletError::StoreIo(format!("rename {}: {e}", meta_path.display())))?;

        debug!(path = %meta_path.display(), "persisted function metadata");
        Ok(())
    }

    /// Recursively delete the record's version directory.
    pub fn remove(&self, record: &FunctionRecord) -> Result<()> {
        let dir = self.version_dir(&record.name, &record.version);
        std::fs::remove_dir_all(&dir)
            .map_err(|e| FuncletError::StoreIo(format!("remove {}: {e}", dir.display())))?;
        debug!(path = %dir.display(), "removed version directory");
        Ok(())
    }

    /// Canonical absolute form of `path`.
    pub fn absolute(&self, path: &Path) -> Result<PathBuf> {
        std::fs::canonicalize(path)
            .map_err(|e| FuncletError::StoreIo(format!("resolve {}: {e}", path.display())))
    }
}
