/// Device log stream: clear the logcat buffer, then follow `adb logcat`.
///
/// The follower is spawned in its own process group (via `process_group(0)`)
/// so it can be torn down with everything adb forked for it.
use crate::config::AdbConfig;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdout, Command};

/// How long a terminated logcat gets to exit before it is killed outright.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Errors produced while driving `adb logcat`.
#[derive(Debug)]
pub enum LogcatError {
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// stdout was not captured (should not happen with `Stdio::piped()`).
    NoStdout,
}

impl std::fmt::Display for LogcatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogcatError::Spawn { command, source } => {
                write!(f, "failed to run {}: {}", command, source)
            }
            LogcatError::NoStdout => write!(f, "logcat stdout was not captured"),
        }
    }
}

impl std::error::Error for LogcatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LogcatError::Spawn { source, .. } => Some(source),
            LogcatError::NoStdout => None,
        }
    }
}

/// `[-s SERIAL] logcat <extra...>`
fn logcat_args(adb: &AdbConfig, extra: &[String]) -> Vec<String> {
    let mut args = adb.device_args();
    args.push("logcat".to_string());
    args.extend(extra.iter().cloned());
    args
}

/// Clear the device log buffer (`adb logcat -c`) so old runs don't leak in.
///
/// A non-zero exit is logged and otherwise ignored.
pub async fn clear(adb: &AdbConfig) -> Result<(), LogcatError> {
    let args = logcat_args(adb, &["-c".to_string()]);
    let status = Command::new(&adb.command)
        .args(&args)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| LogcatError::Spawn {
            command: adb.command.clone(),
            source: e,
        })?;

    if !status.success() {
        tracing::warn!(exit_code = ?status.code(), "clearing logcat failed, continuing");
    }
    Ok(())
}

/// A running `adb logcat` follower.
pub struct Logcat {
    child: Child,
    pid: Option<u32>,
}

/// Spawn `adb logcat` and return it along with a buffered reader over its stdout.
pub fn spawn(adb: &AdbConfig) -> Result<(Logcat, BufReader<ChildStdout>), LogcatError> {
    let args = logcat_args(adb, &adb.logcat_args);
    let mut child = Command::new(&adb.command)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .process_group(0) // New process group for clean kill
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| LogcatError::Spawn {
            command: adb.command.clone(),
            source: e,
        })?;

    let stdout = child.stdout.take().ok_or(LogcatError::NoStdout)?;
    let pid = child.id();
    tracing::info!(pid = ?pid, args = ?args, "logcat started");

    Ok((Logcat { child, pid }, BufReader::new(stdout)))
}

impl Logcat {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// SIGTERM the process group, wait briefly, then kill if still alive.
    pub async fn terminate(mut self) {
        if let Ok(Some(status)) = self.child.try_wait() {
            tracing::debug!(exit_code = ?status.code(), "logcat already exited");
            return;
        }

        if let Some(pid) = self.pid {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::debug!(pid, error = %e, "SIGTERM to logcat group failed");
            }
        }

        match tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(exit_code = ?status.code(), "logcat exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to reap logcat");
            }
            Err(_) => {
                tracing::warn!(pid = ?self.pid, "logcat ignored SIGTERM, killing");
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(error = %e, "failed to kill logcat");
                }
            }
        }
    }
}
