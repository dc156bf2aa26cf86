//! Function records and invocation results
//!
//! [`FunctionRecord`] is the persisted and in-memory description of a
//! registered function; `meta.json` inside each version directory is its
//! authoritative serialized form, and the registry is a reconstructible
//! cache over those files. [`InvokeResult`] is the ephemeral envelope every
//! invocation returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// A registered function: one `(name, version)` artifact set on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Opaque identifier, assigned at registration, immutable afterwards.
    pub id: Uuid,
    /// User-supplied version or auto-generated `v<unix-seconds>`.
    pub version: String,
    /// Logical name; doubles as an on-disk path component.
    pub name: String,
    /// Absolute path to the native executable. Always present.
    #[serde(rename = "binPath")]
    pub bin_path: String,
    /// Absolute path to the WASI module, or empty when no WASM variant
    /// was produced (forces native execution).
    #[serde(rename = "wasmPath")]
    pub wasm_path: String,
    /// Free text; may be empty.
    #[serde(default)]
    pub description: String,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

impl FunctionRecord {
    /// Whether this record has a usable WASM variant: a non-empty path
    /// whose file still exists on disk.
    pub fn has_wasm(&self) -> bool {
        !self.wasm_path.is_empty() && Path::new(&self.wasm_path).exists()
    }
}

/// Captured output of a single invocation.
///
/// `exit_code` is 0 on success, positive when the callee exited non-zero
/// (or was killed by a signal, in which case it is the signal number), and
/// -1 for host-level failures that happened before the callee ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvokeResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: i64,
}

impl InvokeResult {
    /// An envelope for a failure that happened before the callee executed.
    pub fn host_error(message: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: -1,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FunctionRecord {
        FunctionRecord {
            id: Uuid::new_v4(),
            version: "v1".into(),
            name: "echo".into(),
            bin_path: "/data/functions/echo/v1/main.bin".into(),
            wasm_path: String::new(),
            description: "copies stdin to stdout".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("binPath").is_some());
        assert!(json.get("wasmPath").is_some());
        assert!(json.get("created_at").is_some());
        assert!(json.get("bin_path").is_none());
    }

    #[test]
    fn test_record_roundtrip() {
        let record = sample();
        let json = serde_json::to_string_pretty(&record).unwrap();
        let back: FunctionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.name, record.name);
        assert_eq!(back.version, record.version);
        assert_eq!(back.description, record.description);
        assert_eq!(back.created_at, record.created_at);
    }

    #[test]
    fn test_record_missing_description_defaults_empty() {
        let json = r#"{
            "id": "3fa5b1c2-0000-4000-8000-000000000000",
            "version": "v1",
            "name": "f",
            "binPath": "/tmp/f/v1/main.bin",
            "wasmPath": "",
            "created_at": "2025-06-26T09:02:00Z"
        }"#;
        let record: FunctionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.description, "");
    }

    #[test]
    fn test_has_wasm_empty_path() {
        let record = sample();
        assert!(!record.has_wasm());
    }

    #[test]
    fn test_has_wasm_dangling_path() {
        let mut record = sample();
        record.wasm_path = "/nonexistent/main.wasm".into();
        assert!(!record.has_wasm());
    }

    #[test]
    fn test_invoke_result_wire_field_names() {
        let result = InvokeResult {
            stdout: "out".into(),
            stderr: String::new(),
            exit_code: 0,
            duration_ms: 12,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["Stdout"], "out");
        assert_eq!(json["ExitCode"], 0);
        assert_eq!(json["DurationMs"], 12);
        assert!(json.get("stdout").is_none());
    }

    #[test]
    fn test_host_error_envelope() {
        let result = InvokeResult::host_error("spawn failed", 3);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stderr, "spawn failed");
        assert!(result.stdout.is_empty());
        assert_eq!(result.duration_ms, 3);
    }
}
