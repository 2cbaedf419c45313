use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use cligate_core::exec::ProcessResult;
use cligate_core::GatewayError;

/// Build the child command. argv is never handed to a shell.
pub(crate) fn spawn(
    argv: &[String],
    env: &[(String, String)],
    cwd: Option<&Path>,
) -> Result<Child, GatewayError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| GatewayError::process_failed(-1, "empty command"))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = cmd
        .spawn()
        .map_err(|e| GatewayError::process_failed(-1, format!("failed to spawn {program}: {e}")))?;
    debug!(program = %program, pid = ?child.id(), "spawned child process");
    Ok(child)
}

/// Kill the child and wait for it to be reaped.
pub(crate) async fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill on already exited child");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "failed to reap child process");
    }
}

/// Message for a non-zero exit: trimmed stderr, or a default.
pub(crate) fn failure_message(stderr: &str, exit_code: i32) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        format!("Process exited with code {exit_code}")
    } else {
        trimmed.to_string()
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<&mut R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(r) = reader {
        r.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Run one command to completion under a wall-clock timeout.
///
/// A timed-out child is killed and reaped before `Timeout` is returned.
/// A non-zero exit becomes `ProcessFailed` carrying stderr.
pub async fn run_process(
    argv: &[String],
    env: &[(String, String)],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<ProcessResult, GatewayError> {
    let started = Instant::now();
    let mut child = spawn(argv, env, cwd)?;
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let collect = async {
        let (out, err, status) = tokio::join!(
            read_all(stdout.as_mut()),
            read_all(stderr.as_mut()),
            child.wait()
        );
        Ok::<_, std::io::Error>((out?, err?, status?))
    };

    let outcome = tokio::time::timeout(timeout, collect).await;
    let (out, err, status) = match outcome {
        Ok(Ok(collected)) => collected,
        Ok(Err(e)) => {
            kill_and_reap(&mut child).await;
            return Err(GatewayError::process_failed(-1, e.to_string()));
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs_f64(), "process timed out, killing");
            kill_and_reap(&mut child).await;
            return Err(GatewayError::timeout(timeout, argv));
        }
    };

    let stdout = String::from_utf8_lossy(&out).into_owned();
    let stderr = String::from_utf8_lossy(&err).into_owned();
    let exit_code = status.code().unwrap_or(-1);
    let duration = started.elapsed();
    debug!(exit_code, duration_ms = duration.as_millis() as u64, "child process exited");

    if exit_code != 0 {
        return Err(GatewayError::process_failed(
            exit_code,
            failure_message(&stderr, exit_code),
        ));
    }

    Ok(ProcessResult {
        stdout,
        stderr,
        exit_code,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{argv, pid_alive, script_dir, write_script};

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let dir = script_dir();
        let cli = write_script(&dir, "cli", "echo out; echo err >&2");
        let result = run_process(&argv(&cli, &[]), &[], None, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[tokio::test]
    async fn args_are_not_shell_interpreted() {
        let dir = script_dir();
        let cli = write_script(&dir, "cli", "for a in \"$@\"; do echo \"[$a]\"; done");
        let result = run_process(
            &argv(&cli, &["a b", "$(whoami)", ";ls"]),
            &[],
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(result.stdout, "[a b]\n[$(whoami)]\n[;ls]\n");
    }

    #[tokio::test]
    async fn env_and_cwd_reach_the_child() {
        let dir = script_dir();
        let cli = write_script(&dir, "cli", "echo \"$TOKEN\"; pwd");
        let work = tempfile::tempdir().unwrap();
        let result = run_process(
            &argv(&cli, &[]),
            &[("TOKEN".into(), "s3cret".into())],
            Some(work.path()),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let mut lines = result.stdout.lines();
        assert_eq!(lines.next(), Some("s3cret"));
        let cwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(work.path()).unwrap());
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = script_dir();
        let cli = write_script(&dir, "cli", "echo boom >&2; exit 2");
        let err = run_process(&argv(&cli, &[]), &[], None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::process_failed(2, "boom"));
    }

    #[tokio::test]
    async fn non_zero_exit_without_stderr_gets_default_message() {
        let dir = script_dir();
        let cli = write_script(&dir, "cli", "exit 3");
        let err = run_process(&argv(&cli, &[]), &[], None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::process_failed(3, "Process exited with code 3"));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let dir = script_dir();
        let pid_file = dir.path().join("pid");
        let cli = write_script(
            &dir,
            "cli",
            &format!("echo $$ > {}; exec sleep 30", pid_file.display()),
        );
        let started = Instant::now();
        let err = run_process(&argv(&cli, &[]), &[], None, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert!(err.to_string().starts_with("Process timeout after 0.3 seconds: "));
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(!pid_alive(pid.trim()));
    }

    #[tokio::test]
    async fn missing_executable_is_process_failed() {
        let err = run_process(
            &["/definitely/not/here".to_string()],
            &[],
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        match err {
            GatewayError::ProcessFailed { exit_code, .. } => assert_eq!(exit_code, -1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let err = run_process(&[], &[], None, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, GatewayError::process_failed(-1, "empty command"));
    }
}
