//! Function registry — the in-memory index of registered functions.
//!
//! The registry is a read-mostly cache over the on-disk `meta.json` files;
//! it is rebuilt by [`FunctionRegistry::hydrate`] at startup and mutated
//! only by registration and deletion. A single readers-writer lock guards
//! the map: `list`/`get` take shared access, `insert`/`remove` exclusive.

use crate::error::{FuncletError, Result};
use crate::function::FunctionRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Names of the artifact files inside a version directory.
pub const BIN_FILE: &str = "main.bin";
pub const WASM_FILE: &str = "main.wasm";
pub const META_FILE: &str = "meta.json";

/// Process-wide index of registered functions, keyed by id.
///
/// Constructed once at startup and shared behind an `Arc`; there is no
/// global instance.
pub struct FunctionRegistry {
    functions: RwLock<HashMap<Uuid, FunctionRecord>>,
}

impl FunctionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of all records. Iteration order is unspecified.
    pub fn list(&self) -> Vec<FunctionRecord> {
        self.functions.read().values().cloned().collect()
    }

    /// Look up a record by id.
    pub fn get(&self, id: Uuid) -> Result<FunctionRecord> {
        self.functions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| FuncletError::NotFound(format!("no function with id {id}")))
    }

    /// Insert a record, replacing any previous record with the same id.
    pub fn insert(&self, record: FunctionRecord) {
        debug!(id = %record.id, name = %record.name, version = %record.version, "registry insert");
        self.functions.write().insert(record.id, record);
    }

    /// Remove a record by id, returning it.
    pub fn remove(&self, id: Uuid) -> Result<FunctionRecord> {
        self.functions
            .write()
            .remove(&id)
            .ok_or_else(|| FuncletError::NotFound(format!("no function with id {id}")))
    }

    /// Whether any record already claims the `(name, version)` pair.
    pub fn contains_version(&self, name: &str, version: &str) -> bool {
        self.functions
            .read()
            .values()
            .any(|f| f.name == name && f.version == version)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }

    /// Rebuild the index from disk.
    ///
    /// Scans two levels (`<name>/<version>/`) under `base_dir` and adopts
    /// every directory that holds both `main.bin` and a parseable
    /// `meta.json`. `bin_path` and `wasm_path` are rewritten to the paths
    /// observed on disk so records survive a moved installation.
    /// Incomplete or unparseable directories are skipped; a missing base
    /// directory is not an error.
    pub fn hydrate(&self, base_dir: &Path) -> Result<()> {
        let name_dirs = match std::fs::read_dir(base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut adopted = 0usize;
        let mut map = self.functions.write();
        for name_entry in name_dirs.flatten() {
            if !name_entry.path().is_dir() {
                continue;
            }
            let version_dirs = match std::fs::read_dir(name_entry.path()) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for version_entry in version_dirs.flatten() {
                let dir = version_entry.path();
                if !dir.is_dir() {
                    continue;
                }
                match Self::load_record(&dir) {
                    Some(record) => {
                        adopted += 1;
                        map.insert(record.id, record);
                    }
                    None => {
                        debug!(dir = %dir.display(), "skipping incomplete version directory");
                    }
                }
            }
        }
        drop(map);

        info!(functions = adopted, base_dir = %base_dir.display(), "registry hydrated");
        Ok(())
    }

    /// Read one version directory into a record, or `None` if the
    /// directory is incomplete or its metadata does not parse.
    fn load_record(dir: &Path) -> Option<FunctionRecord> {
        let bin_path = dir.join(BIN_FILE);
        let meta_path = dir.join(META_FILE);
        if !bin_path.is_file() || !meta_path.is_file() {
            return None;
        }

        let data = std::fs::read(&meta_path).ok()?;
        let mut record: FunctionRecord = serde_json::from_slice(&data).ok()?;

        // Trust the observed paths over whatever meta.json recorded; the
        // installation may have moved since registration.
        record.bin_path = std::fs::canonicalize(&bin_path)
            .unwrap_or(bin_path)
            .to_string_lossy()
            .into_owned();
        let wasm_path = dir.join(WASM_FILE);
        record.wasm_path = if wasm_path.is_file() {
            std::fs::canonicalize(&wasm_path)
                .unwrap_or(wasm_path)
                .to_string_lossy()
                .into_owned()
        } else {
            String::new()
        };

        Some(record)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
