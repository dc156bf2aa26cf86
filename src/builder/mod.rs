//! Builders — drive an external toolchain to produce execution artifacts.
//!
//! The intake pipeline is toolchain-agnostic: it selects a [`Toolchain`]
//! by the canonical source extension and hands it the source tree plus the
//! desired output paths. One implementation exists today (Go, built with
//! `go` and `tinygo`); adding a language means adding an implementation
//! and a match arm in [`toolchain_for`].

pub mod golang;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// A source-to-artifact compiler for one language ecosystem.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Canonical source extension, without the leading dot.
    fn extension(&self) -> &'static str;

    /// Compile the tree rooted at `root` into a native executable at
    /// `bin_path` and, best-effort, a WASI module at `wasm_path`.
    ///
    /// `fast_path` marks a single-source upload: the entrypoint sits in
    /// `root` itself and the native build targets `linux/amd64`. Archive
    /// uploads walk the tree for the entrypoint and target the host.
    ///
    /// Returns whether the WASI module was produced. A failed WASM build
    /// is logged and absorbed, never an error; a failed native build is
    /// `BuildFailed` with the toolchain's combined output.
    async fn build(
        &self,
        root: &Path,
        bin_path: &Path,
        wasm_path: &Path,
        fast_path: bool,
    ) -> Result<bool>;
}

/// Look up the toolchain registered for a source extension.
pub fn toolchain_for(extension: &str) -> Option<&'static dyn Toolchain> {
    match extension {
        "go" => Some(&golang::GoToolchain),
        _ => None,
    }
}
