//! Command-line arguments and service defaults
//!
//! Funclet is configured entirely from the command line, with `FUNCLET_*`
//! environment variables as fallbacks.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default base directory for persisted function artifacts.
pub const DEFAULT_BASE_DIR: &str = "functions";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Wall-clock budget for a single invocation, in seconds. This is the outer
/// safety net; on Linux the kernel rlimits below are the inner defense.
pub const DEFAULT_INVOKE_TIMEOUT_SECS: u64 = 5;

/// Maximum accepted upload size in bytes.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Address-space cap for native invocations on Linux (soft and hard).
pub const RLIMIT_ADDRESS_SPACE_BYTES: u64 = 128 * 1024 * 1024;

/// CPU-time caps for native invocations on Linux, in seconds.
pub const RLIMIT_CPU_SOFT_SECS: u64 = 2;
pub const RLIMIT_CPU_HARD_SECS: u64 = 3;

/// Process-count caps for native invocations on Linux.
pub const RLIMIT_NPROC_SOFT: u64 = 5;
pub const RLIMIT_NPROC_HARD: u64 = 10;

/// Command-line arguments for the Funclet server
#[derive(Parser, Debug, Clone)]
#[command(name = "funclet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A small Functions-as-a-Service control plane")]
pub struct ServiceArgs {
    /// Address to listen on for the HTTP API
    #[arg(long, env = "FUNCLET_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: String,

    /// Base directory for persisted function artifacts
    #[arg(long, env = "FUNCLET_BASE_DIR", default_value = DEFAULT_BASE_DIR)]
    pub base_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FUNCLET_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Per-invocation wall-clock timeout in seconds
    #[arg(long, env = "FUNCLET_INVOKE_TIMEOUT_SECS", default_value_t = DEFAULT_INVOKE_TIMEOUT_SECS)]
    pub invoke_timeout_secs: u64,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "FUNCLET_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl ServiceArgs {
    /// The invocation timeout as a [`Duration`].
    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }
}
