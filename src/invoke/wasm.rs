//! WASM backend — executes `main.wasm` under WASI preview 1.
//!
//! A fresh engine and store are created per invocation; nothing is shared
//! across calls, so one module can never observe another's state. Guest
//! stdio is wired to in-memory pipes and the module's `_start` export is
//! invoked as a WASI command. The invocation deadline is enforced with
//! epoch interruption: a watchdog bumps the epoch once the budget is
//! spent and the resulting trap is reported in the result envelope.

use crate::function::InvokeResult;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;
use wasmtime::{Config, Engine, Linker, Module, Store, Trap};
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{I32Exit, WasiCtxBuilder};

/// Upper bound on captured stdout/stderr per invocation.
const OUTPUT_CAPACITY: usize = 4 * 1024 * 1024;

/// Sandboxed WASI execution backend.
pub struct WasmBackend {
    timeout: Duration,
}

impl WasmBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Execute the module at `wasm_path` with `input` on stdin. Always
    /// returns an envelope; failures before the guest ran carry
    /// `exit_code = -1`.
    pub async fn invoke(&self, wasm_path: &Path, input: &str) -> InvokeResult {
        let wasm_path = wasm_path.to_path_buf();
        let input = input.to_owned();
        let timeout = self.timeout;

        // wasmtime execution is CPU-bound and synchronous; keep it off the
        // async worker threads.
        match tokio::task::spawn_blocking(move || run_module(&wasm_path, &input, timeout)).await {
            Ok(result) => result,
            Err(e) => InvokeResult::host_error(format!("execution task failed: {e}"), 0),
        }
    }
}

fn run_module(wasm_path: &Path, input: &str, timeout: Duration) -> InvokeResult {
    let setup_started = Instant::now();

    let bytes = match std::fs::read(wasm_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return InvokeResult::host_error(
                format!("read {}: {e}", wasm_path.display()),
                elapsed_ms(setup_started),
            )
        }
    };

    let mut config = Config::new();
    config.epoch_interruption(true);
    let engine = match Engine::new(&config) {
        Ok(engine) => engine,
        Err(e) => {
            return InvokeResult::host_error(
                format!("create engine: {e}"),
                elapsed_ms(setup_started),
            )
        }
    };
    let module = match Module::new(&engine, &bytes) {
        Ok(module) => module,
        Err(e) => {
            return InvokeResult::host_error(
                format!("load module: {e}"),
                elapsed_ms(setup_started),
            )
        }
    };

    let stdout_pipe = MemoryOutputPipe::new(OUTPUT_CAPACITY);
    let stderr_pipe = MemoryOutputPipe::new(OUTPUT_CAPACITY);
    let mut builder = WasiCtxBuilder::new();
    builder.stdout(stdout_pipe.clone()).stderr(stderr_pipe.clone());
    if !input.is_empty() {
        builder.stdin(MemoryInputPipe::new(input.as_bytes().to_vec()));
    }
    let wasi = builder.build_p1();

    let mut linker: Linker<WasiP1Ctx> = Linker::new(&engine);
    if let Err(e) = preview1::add_to_linker_sync(&mut linker, |cx| cx) {
        return InvokeResult::host_error(format!("link WASI: {e}"), elapsed_ms(setup_started));
    }

    let mut store = Store::new(&engine, wasi);
    store.set_epoch_deadline(1);

    // The watchdog holds its own engine handle; a bump that lands after a
    // fast invocation already finished is harmless.
    let watchdog_engine = engine.clone();
    std::thread::spawn(move || {
        std::thread::sleep(timeout);
        watchdog_engine.increment_epoch();
    });

    let started = Instant::now();
    let instance = match linker.instantiate(&mut store, &module) {
        Ok(instance) => instance,
        Err(e) => {
            return finish(
                &stdout_pipe,
                &stderr_pipe,
                Some(format!("instantiate module: {e}")),
                -1,
                elapsed_ms(started),
            )
        }
    };

    let entry = match instance.get_typed_func::<(), ()>(&mut store, "_start") {
        Ok(entry) => entry,
        Err(_) => {
            return finish(
                &stdout_pipe,
                &stderr_pipe,
                Some("no _start entry in wasm module".into()),
                -1,
                elapsed_ms(started),
            )
        }
    };

    let (exit_code, annotation) = match entry.call(&mut store, ()) {
        Ok(()) => (0, None),
        Err(trap) => {
            if let Some(exit) = trap.downcast_ref::<I32Exit>() {
                (exit.0, None)
            } else if matches!(trap.downcast_ref::<Trap>(), Some(Trap::Interrupt)) {
                (
                    -1,
                    Some(format!(
                        "invocation deadline of {}s exceeded; module interrupted",
                        timeout.as_secs_f64()
                    )),
                )
            } else {
                (-1, Some(trap.to_string()))
            }
        }
    };
    let duration_ms = elapsed_ms(started);

    debug!(
        wasm = %wasm_path.display(),
        exit_code,
        duration_ms,
        "wasm invocation complete"
    );

    finish(&stdout_pipe, &stderr_pipe, annotation, exit_code, duration_ms)
}

/// Assemble the envelope from the captured pipes plus an optional stderr
/// annotation.
fn finish(
    stdout_pipe: &MemoryOutputPipe,
    stderr_pipe: &MemoryOutputPipe,
    annotation: Option<String>,
    exit_code: i32,
    duration_ms: i64,
) -> InvokeResult {
    let stdout = String::from_utf8_lossy(&stdout_pipe.contents()).into_owned();
    let mut stderr = String::from_utf8_lossy(&stderr_pipe.contents()).into_owned();
    if let Some(annotation) = annotation {
        if !stderr.is_empty() {
            stderr.push('\n');
        }
        stderr.push_str(&annotation);
    }
    InvokeResult {
        stdout,
        stderr,
        exit_code,
        duration_ms,
    }
}

fn elapsed_ms(start: Instant) -> i64 {
    start.elapsed().as_millis() as i64
}
