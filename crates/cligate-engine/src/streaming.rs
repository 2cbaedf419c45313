use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use cligate_core::GatewayError;

use crate::process::{failure_message, kill_and_reap, spawn};

/// Line-by-line output of one child process.
///
/// Every read is bounded by the same timeout. The child is killed and reaped
/// on timeout, and on drop (the kill is immediate, the reap runs in the background).
pub struct LineStream {
    child: Option<Child>,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    timeout: Duration,
    command: Vec<String>,
    finished: bool,
}

impl LineStream {
    pub fn spawn(
        argv: &[String],
        env: &[(String, String)],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let mut child = spawn(argv, env, cwd)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::process_failed(-1, "child stdout unavailable"))?;

        // Drained concurrently so a chatty stderr cannot block the child.
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Err(e) = pipe.read_to_end(&mut buf).await {
                    debug!(error = %e, "stderr read failed");
                }
                buf
            })
        });

        Ok(Self {
            child: Some(child),
            stdout: BufReader::new(stdout),
            stderr,
            timeout,
            command: argv.to_vec(),
            finished: false,
        })
    }

    /// Next line without its trailing newline. `None` once the child exited
    /// cleanly; an error ends the stream.
    pub async fn next_line(&mut self) -> Option<Result<String, GatewayError>> {
        if self.finished {
            return None;
        }

        let mut buf = Vec::new();
        let read = tokio::time::timeout(self.timeout, self.stdout.read_until(b'\n', &mut buf)).await;
        match read {
            Ok(Ok(0)) => self.finish().await.err().map(Err),
            Ok(Ok(_)) => {
                let line = String::from_utf8_lossy(&buf);
                Some(Ok(line.trim_end_matches(['\n', '\r']).to_string()))
            }
            Ok(Err(e)) => Some(Err(self.abort(GatewayError::process_failed(-1, e.to_string())).await)),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs_f64(), "no output within timeout, killing");
                let err = GatewayError::timeout(self.timeout, &self.command);
                Some(Err(self.abort(err).await))
            }
        }
    }

    async fn abort(&mut self, err: GatewayError) -> GatewayError {
        self.finished = true;
        if let Some(mut child) = self.child.take() {
            kill_and_reap(&mut child).await;
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
        err
    }

    /// stdout hit EOF: wait for exit and judge the status.
    async fn finish(&mut self) -> Result<(), GatewayError> {
        self.finished = true;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                kill_and_reap(&mut child).await;
                return Err(GatewayError::process_failed(-1, e.to_string()));
            }
            Err(_) => {
                kill_and_reap(&mut child).await;
                return Err(GatewayError::timeout(self.timeout, &self.command));
            }
        };

        let exit_code = status.code().unwrap_or(-1);
        if exit_code == 0 {
            return Ok(());
        }
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr = String::from_utf8_lossy(&stderr);
        Err(GatewayError::process_failed(
            exit_code,
            failure_message(&stderr, exit_code),
        ))
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        // SIGKILL goes out here; only the reap waits for a task.
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "kill on drop failed");
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = child.wait().await {
                        warn!(error = %e, "failed to reap abandoned child");
                    }
                });
            }
            Err(_) => {
                if let Err(e) = child.try_wait() {
                    debug!(error = %e, "reap on drop failed");
                }
            }
        }
    }
}
