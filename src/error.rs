//! Error types for Funclet
//!
//! A single crate-wide error enum covers registration, storage, and build
//! failures. Invocation failures are deliberately *not* represented here:
//! once a function record has been found, every invocation outcome — host
//! error, timeout, non-zero exit — is packed into the result envelope so
//! clients can tell user-program failure from infrastructure failure.

use thiserror::Error;

/// Result type alias for Funclet operations
pub type Result<T> = std::result::Result<T, FuncletError>;

/// Main error type for Funclet
#[derive(Error, Debug)]
pub enum FuncletError {
    /// No record with the given id, or no entrypoint in an uploaded tree.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing upload, empty or unsafe name, empty payload.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A record for the same (name, version) pair already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An archive entry resolves outside the extraction destination.
    #[error("illegal archive path: {0}")]
    IllegalPath(String),

    /// Read or write failure while unpacking an archive.
    #[error("extract I/O error: {0}")]
    ExtractIo(String),

    /// Filesystem failure while persisting or removing artifacts.
    #[error("store I/O error: {0}")]
    StoreIo(String),

    /// The native toolchain exited non-zero; carries its combined output.
    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
