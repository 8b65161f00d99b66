/// One benchmark run end to end: follow logcat, launch the benchmark, let
/// trailing lines drain, then stop and summarize.
use crate::bench;
use crate::classify::{EventKind, LogClassifier};
use crate::collector::{CollectorError, CollectorPhase, StreamCollector};
use crate::config::BenchConfig;
use crate::logcat::{self, LogcatError};
use crate::session::{DiagnosticLog, SessionReport};
use crate::timeseries::{self, TimeSeriesError};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that abort a run.
#[derive(Debug)]
pub enum DriverError {
    TimeSeries(TimeSeriesError),
    DebugLog {
        path: PathBuf,
        source: std::io::Error,
    },
    Logcat(LogcatError),
    Collector(CollectorError),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::TimeSeries(e) => write!(f, "{e}"),
            DriverError::DebugLog { path, source } => {
                write!(
                    f,
                    "failed to create debug log {}: {}",
                    path.display(),
                    source
                )
            }
            DriverError::Logcat(e) => write!(f, "{e}"),
            DriverError::Collector(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::TimeSeries(e) => Some(e),
            DriverError::DebugLog { source, .. } => Some(source),
            DriverError::Logcat(e) => Some(e),
            DriverError::Collector(e) => Some(e),
        }
    }
}

impl From<TimeSeriesError> for DriverError {
    fn from(e: TimeSeriesError) -> Self {
        DriverError::TimeSeries(e)
    }
}

impl From<LogcatError> for DriverError {
    fn from(e: LogcatError) -> Self {
        DriverError::Logcat(e)
    }
}

impl From<CollectorError> for DriverError {
    fn from(e: CollectorError) -> Self {
        DriverError::Collector(e)
    }
}

fn open_debug_log(path: &Path) -> Result<DiagnosticLog, DriverError> {
    let file = std::fs::File::create(path).map_err(|e| DriverError::DebugLog {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(DiagnosticLog::new(Box::new(std::io::BufWriter::new(file))))
}

/// Sleep for `duration` unless Ctrl-C arrives first. Returns true if interrupted.
async fn wait_or_interrupt(duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, stopping collection");
            true
        }
    }
}

/// Run the benchmark once and return the collected session report.
pub async fn run(config: &BenchConfig) -> Result<SessionReport, DriverError> {
    // Output files first: a bad path should fail before touching the device.
    let sink = match &config.output.time_series {
        Some(path) => Some(timeseries::create_file(path)?),
        None => None,
    };
    let diagnostics = match &config.output.debug_log {
        Some(path) => Some(open_debug_log(path)?),
        None => None,
    };

    logcat::clear(&config.adb).await?;
    let (logcat, lines) = logcat::spawn(&config.adb)?;

    let classifier = LogClassifier::new(config.classifier.date_prefix.clone());
    let mut collector = StreamCollector::new(classifier);
    collector.start(lines, sink, diagnostics)?;

    let mut interrupted = wait_or_interrupt(Duration::from_secs(config.timing.settle_secs)).await;

    if !interrupted {
        println!("{}", bench::command_line(&config.adb, &config.benchmark));
        tokio::select! {
            result = bench::run_benchmark(&config.adb, &config.benchmark) => match result {
                Ok(result) if result.exit_code != Some(0) => {
                    tracing::warn!(
                        pid = result.pid,
                        exit_code = ?result.exit_code,
                        duration_secs = result.duration.as_secs_f64(),
                        "benchmark exited unsuccessfully, keeping collected data"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "benchmark did not run");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, benchmark killed");
                interrupted = true;
            }
        }
    }

    if !interrupted {
        println!("Waiting");
        wait_or_interrupt(Duration::from_secs(config.timing.drain_secs)).await;
        println!("Done waiting");
    }

    if collector.phase() != CollectorPhase::Active {
        tracing::warn!(
            pid = ?logcat.pid(),
            "no session start marker seen in logcat; nothing was counted"
        );
    }

    let stopped = collector.stop().await;
    logcat.terminate().await;
    stopped?;

    Ok(collector.report().cloned().unwrap_or_default())
}

/// Print final per-stage counts.
pub fn print_summary(report: &SessionReport) {
    println!("Session summary:");
    for kind in EventKind::ALL {
        println!("  {:<14} {}", kind.column_name(), report.counts.get(kind));
    }
    println!("  {:<14} {}", "events", report.counts.total());
    println!("  {:<14} {}", "records", report.records_written);
    if let Some(t) = report.last_relative_time {
        println!("  {:<14} {:.6}s", "span", t);
    }
}

/// Print a short overview of an existing time-series file.
pub fn inspect(path: &Path) -> Result<(), TimeSeriesError> {
    let records = timeseries::read_file(path)?;
    println!("{}: {} records", path.display(), records.len());

    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return Ok(());
    };
    println!(
        "  time {:.6}s .. {:.6}s",
        first.relative_time, last.relative_time
    );
    for kind in EventKind::ALL {
        println!("  {:<14} {}", kind.column_name(), last.counts.get(kind));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdbConfig, OutputConfig, TimingConfig};

    /// Executable script standing in for adb: `logcat` prints a canned
    /// session, everything else succeeds silently.
    fn fake_adb(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-adb");
        std::fs::write(
            &script,
            r#"#!/bin/sh
case "$1" in
logcat)
    if [ "$2" = "-c" ]; then exit 0; fi
    echo "I/OMX ( 7): init OMX"
    echo "I/OMX ( 7): 2014-01-01 00:00:00.000000 UTC - Inserting frame 0"
    echo "I/OMX ( 7): 2014-01-01 00:00:00.010000 UTC - Encoding frame 0"
    echo "I/OMX ( 7): 2014-01-01 00:00:00.020000 UTC - Emit NAL 0"
    echo "I/OMX ( 7): 2014-01-01 00:00:00.030000 UTC - Configuring"
    echo "I/OMX ( 7): 2014-01-01 00:00:00.040000 UTC - Decoded frame 0"
    ;;
esac
exit 0
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_str().unwrap().to_string()
    }

    /// Config writing both outputs into `dir`, with no settle wait.
    fn test_config(dir: &Path, adb_command: &str) -> BenchConfig {
        BenchConfig {
            adb: AdbConfig {
                command: adb_command.to_string(),
                ..Default::default()
            },
            timing: TimingConfig {
                settle_secs: 0,
                drain_secs: 1,
            },
            output: OutputConfig {
                time_series: Some(dir.join("run.tsv")),
                debug_log: Some(dir.join("raw.log")),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_collects_canned_session() {
        let dir = tempfile::tempdir().unwrap();
        let adb = fake_adb(dir.path());
        let config = test_config(dir.path(), &adb);

        let report = run(&config).await.unwrap();
        assert!(report.active);
        assert_eq!(report.counts.get(EventKind::FrameInserted), 1);
        assert_eq!(report.counts.get(EventKind::EncodeStarted), 1);
        assert_eq!(report.counts.get(EventKind::NalEmitted), 1);
        assert_eq!(report.counts.get(EventKind::FrameDecoded), 1);
        assert_eq!(report.records_written, 4);
        assert_eq!(report.last_relative_time, Some(0.04));

        let records = timeseries::read_file(&dir.path().join("run.tsv")).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].relative_time, 0.0);
        assert_eq!(records[3].counts, report.counts);

        let raw = std::fs::read_to_string(dir.path().join("raw.log")).unwrap();
        assert!(raw.starts_with("I/OMX ( 7): init OMX\n"));
        assert_eq!(raw.lines().count(), 6);

        inspect(&dir.path().join("run.tsv")).unwrap();
        print_summary(&report);
    }

    #[tokio::test]
    async fn test_run_fails_early_on_bad_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), "nonexistent-binary-xyz");
        config.output.time_series = Some(PathBuf::from("/nonexistent-dir/run.tsv"));
        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, DriverError::TimeSeries(_)));
    }

    #[tokio::test]
    async fn test_run_missing_adb_is_logcat_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), "nonexistent-binary-xyz");
        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, DriverError::Logcat(_)));
    }

    #[test]
    fn test_inspect_missing_file() {
        assert!(inspect(Path::new("/nonexistent/run.tsv")).is_err());
    }
}
