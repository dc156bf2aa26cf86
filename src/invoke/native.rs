//! Native backend — runs `main.bin` as a confined subprocess.
//!
//! On Linux the child is placed in its own session group so the timeout
//! can kill the whole tree, and runs under kernel rlimits (address space,
//! CPU time, process count); the wall-clock timeout is the outer safety
//! net, the rlimits the inner defense. On other platforms the process
//! group is inherited and only the child itself is killed on timeout.

use crate::function::InvokeResult;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Subprocess execution backend.
pub struct NativeBackend {
    timeout: Duration,
}

impl NativeBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Execute `bin_path` with `input` on stdin, capturing both output
    /// streams. Always returns an envelope; failures before the callee
    /// executed carry `exit_code = -1`.
    pub async fn invoke(&self, bin_path: &Path, input: &str) -> InvokeResult {
        let mut cmd = Command::new(bin_path);
        cmd.stdin(if input.is_empty() {
            Stdio::null()
        } else {
            Stdio::piped()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                // New session group so a timeout can kill the whole tree.
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                apply_rlimits()
            });
        }

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return InvokeResult::host_error(
                    format!("spawn {}: {e}", bin_path.display()),
                    elapsed_ms(start),
                )
            }
        };

        if !input.is_empty() {
            if let Some(mut stdin) = child.stdin.take() {
                let payload = input.as_bytes().to_vec();
                tokio::spawn(async move {
                    let _ = stdin.write_all(&payload).await;
                    // Dropping the handle closes the pipe and delivers EOF.
                });
            }
        }

        // Drain both pipes concurrently with the wait; a child that fills
        // a pipe buffer must not deadlock against us.
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        let mut timed_out = false;
        let wait_result = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                timed_out = true;
                kill_runaway(&mut child).await;
                child.wait().await
            }
        };
        let duration_ms = elapsed_ms(start);

        let stdout = stdout_task.await.unwrap_or_default();
        let mut stderr = stderr_task.await.unwrap_or_default();

        let exit_code = match wait_result {
            Ok(status) => exit_code_of(&status),
            Err(e) => {
                if !stderr.is_empty() {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("wait failed: {e}"));
                -1
            }
        };

        if timed_out {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "invocation timed out after {}s; child killed",
                self.timeout.as_secs_f64()
            ));
        }

        debug!(
            bin = %bin_path.display(),
            exit_code,
            duration_ms,
            timed_out,
            "native invocation complete"
        );

        InvokeResult {
            stdout,
            stderr,
            exit_code,
            duration_ms,
        }
    }
}

/// Collect a pipe to a lossy string on its own task.
fn drain<R>(reader: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// On Linux the child leads its own session group, so the kill reaches
/// every process it spawned; elsewhere only the child is signalled.
async fn kill_runaway(child: &mut tokio::process::Child) {
    #[cfg(target_os = "linux")]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
        return;
    }
    let _ = child.start_kill();
}

/// Exit code from a child status: the code when it exited, the signal
/// number when it was killed, -1 otherwise.
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return signal;
        }
    }
    -1
}

/// Kernel resource caps for untrusted children, applied between fork and
/// exec.
#[cfg(target_os = "linux")]
fn apply_rlimits() -> std::io::Result<()> {
    use crate::config::{
        RLIMIT_ADDRESS_SPACE_BYTES, RLIMIT_CPU_HARD_SECS, RLIMIT_CPU_SOFT_SECS,
        RLIMIT_NPROC_HARD, RLIMIT_NPROC_SOFT,
    };

    let limits = [
        (
            libc::RLIMIT_AS,
            RLIMIT_ADDRESS_SPACE_BYTES,
            RLIMIT_ADDRESS_SPACE_BYTES,
        ),
        (libc::RLIMIT_CPU, RLIMIT_CPU_SOFT_SECS, RLIMIT_CPU_HARD_SECS),
        (libc::RLIMIT_NPROC, RLIMIT_NPROC_SOFT, RLIMIT_NPROC_HARD),
    ];
    for (resource, soft, hard) in limits {
        let limit = libc::rlimit {
            rlim_cur: soft,
            rlim_max: hard,
        };
        if unsafe { libc::setrlimit(resource, &limit) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

fn elapsed_ms(start: Instant) -> i64 {
    start.elapsed().as_millis() as i64
}
