/// Background log collector: consumes an unbounded line source on its own
/// task, feeds every line to a `Session`, and hands back the session report
/// when stopped.
use crate::classify::LogClassifier;
use crate::session::{DiagnosticLog, Session, SessionReport};
use crate::timeseries::TimeSeriesSink;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorPhase {
    /// Never started.
    Idle,
    /// Reading lines, waiting for the session start marker.
    Initializing,
    /// Start marker seen, counting events.
    Active,
    /// Consumer torn down.
    Stopped,
}

/// Errors surfaced by the collector lifecycle.
#[derive(Debug)]
pub enum CollectorError {
    /// `start()` while a session is still running.
    AlreadyRunning,
    /// Writing the time series failed; the consumer stopped at that point.
    Sink { source: std::io::Error },
    /// The consumer task panicked or was aborted.
    Join { source: tokio::task::JoinError },
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "collector is already running"),
            CollectorError::Sink { source } => {
                write!(f, "failed to write time series: {}", source)
            }
            CollectorError::Join { source } => {
                write!(f, "collector task failed: {}", source)
            }
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectorError::AlreadyRunning => None,
            CollectorError::Sink { source } => Some(source),
            CollectorError::Join { source } => Some(source),
        }
    }
}

/// What the consumer task hands back when it ends.
struct Outcome {
    report: SessionReport,
    sink_error: Option<std::io::Error>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<Outcome>,
}

pub struct StreamCollector {
    classifier: LogClassifier,
    phase: Arc<watch::Sender<CollectorPhase>>,
    running: Option<Running>,
    report: Option<SessionReport>,
}

impl StreamCollector {
    pub fn new(classifier: LogClassifier) -> Self {
        let (phase, _) = watch::channel(CollectorPhase::Idle);
        Self {
            classifier,
            phase: Arc::new(phase),
            running: None,
            report: None,
        }
    }

    pub fn phase(&self) -> CollectorPhase {
        *self.phase.borrow()
    }

    /// Report of the last stopped session.
    pub fn report(&self) -> Option<&SessionReport> {
        self.report.as_ref()
    }

    /// Start consuming `source` on a new task with a fresh session.
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    pub fn start<R>(
        &mut self,
        source: R,
        sink: Option<TimeSeriesSink>,
        diagnostics: Option<DiagnosticLog>,
    ) -> Result<(), CollectorError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        if self.running.is_some() {
            return Err(CollectorError::AlreadyRunning);
        }

        let session = Session::new(self.classifier.clone(), sink, diagnostics);
        let cancel = CancellationToken::new();
        self.report = None;
        self.phase.send_replace(CollectorPhase::Initializing);

        let handle = tokio::spawn(consume(
            source,
            session,
            cancel.clone(),
            Arc::clone(&self.phase),
        ));
        tracing::debug!("collector started");
        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Cancel the consumer and wait for it to finish.
    ///
    /// Once this returns no further line is processed. Calling it again is a
    /// no-op; a sink error is only returned by the call that joined the task.
    pub async fn stop(&mut self) -> Result<(), CollectorError> {
        let Some(running) = self.running.take() else {
            if self.report.is_none() {
                self.report = Some(SessionReport::default());
            }
            self.phase.send_replace(CollectorPhase::Stopped);
            return Ok(());
        };

        running.cancel.cancel();
        let joined = running.handle.await;
        self.phase.send_replace(CollectorPhase::Stopped);

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report = Some(SessionReport::default());
                return Err(CollectorError::Join { source: e });
            }
        };

        tracing::debug!(
            records = outcome.report.records_written,
            active = outcome.report.active,
            "collector stopped"
        );
        self.report = Some(outcome.report);
        match outcome.sink_error {
            Some(e) => Err(CollectorError::Sink { source: e }),
            None => Ok(()),
        }
    }

    /// Wait until the session start marker has been seen. Returns false if
    /// the collector stopped first.
    #[allow(dead_code)]
    pub async fn wait_active(&self) -> bool {
        let mut rx = self.phase.subscribe();
        let result = rx
            .wait_for(|p| matches!(p, CollectorPhase::Active | CollectorPhase::Stopped))
            .await;
        matches!(result.as_deref(), Ok(CollectorPhase::Active))
    }
}

/// Consumer loop. Ends on cancellation, end of stream, a read error, or a
/// sink write failure.
async fn consume<R>(
    mut source: R,
    mut session: Session,
    cancel: CancellationToken,
    phase: Arc<watch::Sender<CollectorPhase>>,
) -> Outcome
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut sink_error = None;

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = source.read_until(b'\n', &mut buf) => read,
        };
        // A line that raced with stop() is dropped
        if cancel.is_cancelled() {
            break;
        }
        match read {
            Ok(0) => {
                tracing::debug!("line source closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "line source read failed, ending collection");
                break;
            }
        }

        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);

        let was_active = session.is_active();
        if let Err(e) = session.process_line(line) {
            tracing::error!(error = %e, "time series write failed, ending collection");
            sink_error = Some(e);
            break;
        }
        if !was_active && session.is_active() {
            phase.send_replace(CollectorPhase::Active);
        }
    }

    let report = match session.finish() {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "failed to flush time series");
            sink_error.get_or_insert(e);
            session.report()
        }
    };
    Outcome { report, sink_error }
}
