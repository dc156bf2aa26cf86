//! Go toolchain: `go build` for the native target, `tinygo` for WASI.

use crate::error::{FuncletError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

const ENTRYPOINT: &str = "main.go";
const MANIFEST: &str = "go.mod";
const DEFAULT_MANIFEST: &str = "module example.com/tmpmod\n\ngo 1.20\n";

/// Builds Go sources with the `go` and `tinygo` executables from `PATH`.
pub struct GoToolchain;

impl GoToolchain {
    /// Locate the directory holding the first `main.go`, walking the tree
    /// depth-first in lexicographic order.
    fn find_entrypoint(&self, root: &Path) -> Result<PathBuf> {
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && entry.file_name() == std::ffi::OsStr::new(ENTRYPOINT)
            {
                // WalkDir yields files with at least one path component
                // above them, so parent() cannot fail here.
                return Ok(entry
                    .path()
                    .parent()
                    .unwrap_or(root)
                    .to_path_buf());
            }
        }
        Err(FuncletError::NotFound(format!(
            "no {ENTRYPOINT} entrypoint under {}",
            root.display()
        )))
    }

    /// Synthesize a minimal `go.mod` when the source tree ships none.
    fn ensure_manifest(&self, dir: &Path) -> Result<()> {
        let manifest = dir.join(MANIFEST);
        if !manifest.exists() {
            debug!(dir = %dir.display(), "synthesizing default go.mod");
            std::fs::write(&manifest, DEFAULT_MANIFEST)?;
        }
        Ok(())
    }

    /// Run a toolchain command in `dir`, failing with the combined output.
    async fn run_tool(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
    ) -> Result<()> {
        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .envs(envs.iter().copied())
            .output()
            .await
            .map_err(|e| FuncletError::BuildFailed(format!("{program}: {e}")))?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(FuncletError::BuildFailed(format!(
                "{program} {} exited with {}: {combined}",
                args.join(" "),
                output.status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl super::Toolchain for GoToolchain {
    fn extension(&self) -> &'static str {
        "go"
    }

    async fn build(
        &self,
        root: &Path,
        bin_path: &Path,
        wasm_path: &Path,
        fast_path: bool,
    ) -> Result<bool> {
        let source_dir = if fast_path {
            root.to_path_buf()
        } else {
            self.find_entrypoint(root)?
        };
        self.ensure_manifest(&source_dir)?;

        let module_env: &[(&str, &str)] = &[("GO111MODULE", "on")];
        let cross_env: &[(&str, &str)] = &[
            ("GO111MODULE", "on"),
            ("GOOS", "linux"),
            ("GOARCH", "amd64"),
        ];

        // Resolve module dependencies up front so the build output stays a
        // pure compile log.
        if fast_path {
            self.run_tool(&source_dir, "go", &["mod", "tidy"], cross_env)
                .await?;
        } else {
            self.run_tool(&source_dir, "go", &["mod", "download"], module_env)
                .await?;
        }

        let bin = bin_path.to_string_lossy().into_owned();
        let build_env = if fast_path { cross_env } else { module_env };
        self.run_tool(&source_dir, "go", &["build", "-o", bin.as_str(), "."], build_env)
            .await?;
        debug!(bin = %bin_path.display(), "native build complete");

        // WASI compilation imposes subset restrictions the source may
        // violate; degrade to native-only rather than failing the upload.
        let wasm = wasm_path.to_string_lossy().into_owned();
        match self
            .run_tool(
                &source_dir,
                "tinygo",
                &["build", "-o", wasm.as_str(), "-target=wasi", "."],
                module_env,
            )
            .await
        {
            Ok(()) => {
                debug!(wasm = %wasm_path.display(), "wasm build complete");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "wasm build failed; function will run natively");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Toolchain;

    #[test]
    fn test_find_entrypoint_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("app").join("cmd");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("main.go"), b"package main\n").unwrap();

        let dir = GoToolchain.find_entrypoint(tmp.path()).unwrap();
        assert_eq!(dir, nested);
    }

    #[test]
    fn test_find_entrypoint_prefers_lexicographic_first() {
        let tmp = tempfile::tempdir().unwrap();
        for sub in ["beta", "alpha"] {
            let dir = tmp.path().join(sub);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("main.go"), b"package main\n").unwrap();
        }

        let dir = GoToolchain.find_entrypoint(tmp.path()).unwrap();
        assert_eq!(dir, tmp.path().join("alpha"));
    }

    #[test]
    fn test_find_entrypoint_missing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("helper.go"), b"package main\n").unwrap();
        assert!(matches!(
            GoToolchain.find_entrypoint(tmp.path()),
            Err(FuncletError::NotFound(_))
        ));
    }

    #[test]
    fn test_ensure_manifest_synthesizes_default() {
        let tmp = tempfile::tempdir().unwrap();
        GoToolchain.ensure_manifest(tmp.path()).unwrap();
        let content = std::fs::read_to_string(tmp.path().join("go.mod")).unwrap();
        assert!(content.contains("module example.com/tmpmod"));
    }

    #[test]
    fn test_ensure_manifest_preserves_existing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("go.mod"), "module custom/mod\n").unwrap();
        GoToolchain.ensure_manifest(tmp.path()).unwrap();
        let content = std::fs::read_to_string(tmp.path().join("go.mod")).unwrap();
        assert_eq!(content, "module custom/mod\n");
    }

    #[test]
    fn test_extension() {
        assert_eq!(GoToolchain.extension(), "go");
    }
}
