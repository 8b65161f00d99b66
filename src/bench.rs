/// Benchmark trigger: run the device-side benchmark script through
/// `adb shell` and wait for it to finish.
use crate::config::{AdbConfig, BenchmarkConfig};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Result of a completed benchmark run.
#[derive(Debug)]
pub struct BenchResult {
    /// Process exit code (None if killed by signal).
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the run.
    pub duration: std::time::Duration,
    /// Child PID (for logging/diagnostics).
    pub pid: u32,
}

/// Errors that can occur while running the benchmark.
#[derive(Debug)]
pub enum BenchError {
    /// Failed to spawn the adb subprocess.
    Spawn { source: std::io::Error },
    /// Failed while waiting on the subprocess.
    Io { source: std::io::Error },
}

impl std::fmt::Display for BenchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchError::Spawn { source } => {
                write!(f, "failed to spawn benchmark command: {}", source)
            }
            BenchError::Io { source } => {
                write!(f, "I/O error while running benchmark: {}", source)
            }
        }
    }
}

impl std::error::Error for BenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BenchError::Spawn { source } => Some(source),
            BenchError::Io { source } => Some(source),
        }
    }
}

/// Build the adb argument list:
/// `[-s SERIAL] shell sh <script> -video-benchmark-file <file>
/// [-video-benchmark-receive] -video-benchmark-frames <n> [extra...]`.
pub fn build_args(adb: &AdbConfig, bench: &BenchmarkConfig) -> Vec<String> {
    let mut args = adb.device_args();
    args.extend([
        "shell".to_string(),
        "sh".to_string(),
        bench.script.clone(),
        "-video-benchmark-file".to_string(),
        bench.file.clone(),
    ]);
    if bench.receive {
        args.push("-video-benchmark-receive".to_string());
    }
    args.push("-video-benchmark-frames".to_string());
    args.push(bench.frames.to_string());

    let frames = bench.frames.to_string();
    args.extend(bench.extra_args.iter().map(|arg| {
        arg.replace("{file}", &bench.file)
            .replace("{frames}", &frames)
    }));
    args
}

/// Full command line as a printable string.
pub fn command_line(adb: &AdbConfig, bench: &BenchmarkConfig) -> String {
    let mut parts = vec![adb.command.clone()];
    parts.extend(build_args(adb, bench));
    parts.join(" ")
}

/// Run the benchmark and wait for it to exit.
///
/// stdout/stderr are inherited so the script's own output reaches the
/// terminal. The child is killed if this future is dropped (Ctrl-C).
pub async fn run_benchmark(
    adb: &AdbConfig,
    bench: &BenchmarkConfig,
) -> Result<BenchResult, BenchError> {
    let args = build_args(adb, bench);
    tracing::info!(command = %adb.command, args = ?args, "launching benchmark");

    let start = Instant::now();

    let mut child = Command::new(&adb.command)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BenchError::Spawn { source: e })?;

    let pid = child.id().unwrap_or(0);
    tracing::debug!(pid, "benchmark subprocess started");

    let status = child
        .wait()
        .await
        .map_err(|e| BenchError::Io { source: e })?;

    let duration = start.elapsed();
    let exit_code = status.code();
    tracing::info!(
        exit_code = ?exit_code,
        duration_secs = duration.as_secs_f64(),
        "benchmark finished"
    );

    Ok(BenchResult {
        exit_code,
        duration,
        pid,
    })
}
