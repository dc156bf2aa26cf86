//! Invocation engine — dispatches a request to an execution backend.
//!
//! The WASM backend is preferred whenever the record carries a WASM
//! variant that still exists on disk; otherwise the native subprocess
//! backend runs `main.bin`. Both backends share one contract: given an
//! artifact path and an input payload they always produce a result
//! envelope. Only an unknown function id is a real error here.

pub mod native;
pub mod wasm;

use crate::error::Result;
use crate::function::InvokeResult;
use crate::registry::FunctionRegistry;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Runs registered functions against input payloads.
pub struct InvocationEngine {
    registry: Arc<FunctionRegistry>,
    wasm: wasm::WasmBackend,
    native: native::NativeBackend,
}

impl InvocationEngine {
    pub fn new(registry: Arc<FunctionRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            wasm: wasm::WasmBackend::new(timeout),
            native: native::NativeBackend::new(timeout),
        }
    }

    /// Invoke function `id` with `input` on stdin.
    ///
    /// Fails only when the id is unknown; every outcome after the lookup —
    /// including host-level failures — is reported inside the envelope.
    pub async fn invoke(&self, id: Uuid, input: &str) -> Result<InvokeResult> {
        let record = self.registry.get(id)?;

        let result = if record.has_wasm() {
            debug!(id = %id, name = %record.name, backend = "wasm", "dispatching invocation");
            self.wasm.invoke(Path::new(&record.wasm_path), input).await
        } else {
            debug!(id = %id, name = %record.name, backend = "native", "dispatching invocation");
            self.native.invoke(Path::new(&record.bin_path), input).await
        };
        Ok(result)
    }
}
