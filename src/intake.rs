//! Intake pipeline — orchestrates one upload end to end.
//!
//! Extractor → builder → store → registry. The version directory is held
//! under a scoped guard from the moment it is created: every failure exit
//! deletes it again, so a failed build never leaves a half-populated
//! directory for the next hydration to trip over.

use crate::builder::toolchain_for;
use crate::error::{FuncletError, Result};
use crate::function::FunctionRecord;
use crate::registry::{FunctionRegistry, BIN_FILE, WASM_FILE};
use crate::store::{extract::extract_zip, ArtifactStore};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Name under which an uploaded archive is retained in the version
/// directory.
const ARCHIVE_FILE: &str = "src.zip";

/// One parsed upload, ready for registration.
#[derive(Debug)]
pub struct UploadRequest {
    pub name: String,
    /// Empty or absent means auto-generate `v<unix-seconds>`.
    pub version: Option<String>,
    pub description: String,
    /// Lowercased upload extension without the dot; selects the intake
    /// path (`zip`, a toolchain source extension, or prebuilt binary).
    pub extension: String,
    pub payload: Vec<u8>,
}

/// Orchestrates registration of uploaded functions.
pub struct IntakePipeline {
    store: ArtifactStore,
    registry: Arc<FunctionRegistry>,
}

impl IntakePipeline {
    pub fn new(store: ArtifactStore, registry: Arc<FunctionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Register an upload: persist, build if needed, index.
    pub async fn register(&self, request: UploadRequest) -> Result<FunctionRecord> {
        validate_path_component("name", &request.name)?;
        if let Some(version) = request.version.as_deref().filter(|v| !v.is_empty()) {
            validate_path_component("version", version)?;
        }
        if request.payload.is_empty() {
            return Err(FuncletError::BadRequest("uploaded file is empty".into()));
        }

        let version = request
            .version
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("v{}", Utc::now().timestamp()));

        if self.registry.contains_version(&request.name, &version) {
            return Err(FuncletError::Conflict(format!(
                "function {} version {version} is already registered",
                request.name
            )));
        }

        let dir = self.store.create_version_dir(&request.name, &version)?;
        let mut guard = CleanupGuard::armed(dir.clone());

        let bin_path = dir.join(BIN_FILE);
        let wasm_path = dir.join(WASM_FILE);

        let wasm_built = match request.extension.as_str() {
            "zip" => {
                let archive_path = dir.join(ARCHIVE_FILE);
                std::fs::write(&archive_path, &request.payload).map_err(|e| {
                    FuncletError::StoreIo(format!("write {}: {e}", archive_path.display()))
                })?;
                extract_zip(&archive_path, &dir)?;

                let toolchain = toolchain_for("go").ok_or_else(|| {
                    FuncletError::BadRequest("no toolchain for archive sources".into())
                })?;
                toolchain.build(&dir, &bin_path, &wasm_path, false).await?
            }
            ext => match toolchain_for(ext) {
                Some(toolchain) => {
                    let source_path = dir.join(format!("main.{ext}"));
                    std::fs::write(&source_path, &request.payload).map_err(|e| {
                        FuncletError::StoreIo(format!("write {}: {e}", source_path.display()))
                    })?;
                    toolchain.build(&dir, &bin_path, &wasm_path, true).await?
                }
                None => {
                    // Anything else is taken as a prebuilt executable.
                    std::fs::write(&bin_path, &request.payload).map_err(|e| {
                        FuncletError::StoreIo(format!("write {}: {e}", bin_path.display()))
                    })?;
                    mark_executable(&bin_path)?;
                    false
                }
            },
        };

        let record = FunctionRecord {
            id: Uuid::new_v4(),
            version,
            name: request.name,
            bin_path: self.store.absolute(&bin_path)?.to_string_lossy().into_owned(),
            wasm_path: if wasm_built {
                self.store
                    .absolute(&wasm_path)?
                    .to_string_lossy()
                    .into_owned()
            } else {
                String::new()
            },
            description: request.description,
            created_at: Utc::now(),
        };

        self.store.persist_meta(&record)?;
        self.registry.insert(record.clone());
        guard.disarm();

        info!(
            id = %record.id,
            name = %record.name,
            version = %record.version,
            wasm = wasm_built,
            "function registered"
        );
        Ok(record)
    }
}

/// Names and versions become path components; restrict them to a
/// filesystem-safe alphabet.
fn validate_path_component(label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(FuncletError::BadRequest(format!("{label} must not be empty")));
    }
    if value == "." || value == ".." {
        return Err(FuncletError::BadRequest(format!("invalid {label}: {value}")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(FuncletError::BadRequest(format!(
            "{label} may only contain alphanumerics, '.', '_' and '-'"
        )));
    }
    Ok(())
}

fn mark_executable(path: &std::path::Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| FuncletError::StoreIo(format!("chmod {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Deletes the version directory on drop unless disarmed.
struct CleanupGuard {
    dir: Option<PathBuf>,
}

impl CleanupGuard {
    fn armed(dir: PathBuf) -> Self {
        Self { dir: Some(dir) }
    }

    fn disarm(&mut self) {
        self.dir = None;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "failed to clean up after aborted intake");
            }
        }
    }
}
