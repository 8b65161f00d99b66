/// Per-session aggregate state: stage counters, the session clock, and the
/// line-by-line processing that feeds them.
///
/// A `Session` is owned by exactly one collector task for its whole life.
use crate::classify::{EventKind, LogClassifier};
use crate::timeseries::{TimeSeriesRecord, TimeSeriesSink};
use chrono::NaiveDateTime;
use std::io::Write;

/// Cumulative count per stage, in `EventKind` declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    counts: [u64; EventKind::ALL.len()],
}

impl CounterSnapshot {
    pub fn from_values(counts: [u64; EventKind::ALL.len()]) -> Self {
        Self { counts }
    }

    pub fn get(&self, kind: EventKind) -> u64 {
        self.counts[kind.index()]
    }

    pub fn increment(&mut self, kind: EventKind) {
        self.counts[kind.index()] += 1;
    }

    pub fn values(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

impl std::fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, kind) in EventKind::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", kind.column_name(), self.get(*kind))?;
        }
        Ok(())
    }
}

/// Log timestamp of the first stamped line after session start.
/// Set once, never moved.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionClock {
    start: Option<NaiveDateTime>,
}

impl SessionClock {
    /// Arm the clock if unset. Later calls leave the start untouched.
    pub fn arm(&mut self, timestamp: NaiveDateTime) -> NaiveDateTime {
        *self.start.get_or_insert(timestamp)
    }

    #[allow(dead_code)]
    pub fn start(&self) -> Option<NaiveDateTime> {
        self.start
    }

    /// Seconds since the session start, at microsecond resolution.
    /// Stamps earlier than the start clamp to zero.
    pub fn relative_secs(&self, timestamp: NaiveDateTime) -> Option<f64> {
        let start = self.start?;
        let micros = (timestamp - start).num_microseconds().unwrap_or(i64::MAX);
        if micros < 0 {
            tracing::debug!(%timestamp, %start, "log stamp precedes session start");
            return Some(0.0);
        }
        Some(micros as f64 / 1_000_000.0)
    }
}

/// Optional raw-line log of everything seen once the session is active.
pub struct DiagnosticLog {
    out: Box<dyn Write + Send>,
    failed: bool,
}

impl DiagnosticLog {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out, failed: false }
    }

    /// Record a line. Failures are reported once and otherwise ignored.
    fn record(&mut self, line: &str) {
        if self.failed {
            return;
        }
        if let Err(e) = writeln!(self.out, "{line}") {
            tracing::warn!(error = %e, "diagnostic log write failed, disabling it");
            self.failed = true;
        }
    }

    fn flush(&mut self) {
        if !self.failed {
            if let Err(e) = self.out.flush() {
                tracing::warn!(error = %e, "failed to flush diagnostic log");
            }
        }
    }
}

/// Final state of a session, handed back when the collector stops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub counts: CounterSnapshot,
    /// Whether the start marker was ever seen.
    pub active: bool,
    pub records_written: u64,
    /// Relative time of the last classified event.
    pub last_relative_time: Option<f64>,
}

/// Aggregate state for one collection session.
pub struct Session {
    classifier: LogClassifier,
    active: bool,
    counts: CounterSnapshot,
    clock: SessionClock,
    records_written: u64,
    last_relative_time: Option<f64>,
    sink: Option<TimeSeriesSink>,
    diagnostics: Option<DiagnosticLog>,
}

impl Session {
    pub fn new(
        classifier: LogClassifier,
        sink: Option<TimeSeriesSink>,
        diagnostics: Option<DiagnosticLog>,
    ) -> Self {
        Self {
            classifier,
            active: false,
            counts: CounterSnapshot::default(),
            clock: SessionClock::default(),
            records_written: 0,
            last_relative_time: None,
            sink,
            diagnostics,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    #[allow(dead_code)]
    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Feed one raw log line.
    ///
    /// Returns the record produced for a classified line. The only error is
    /// a failed write to the time-series sink; every malformed or
    /// unrecognized line is dropped silently.
    pub fn process_line(&mut self, line: &str) -> std::io::Result<Option<TimeSeriesRecord>> {
        if !self.active {
            if !self.classifier.is_session_start(line) {
                return Ok(None);
            }
            self.active = true;
            tracing::info!(line, "session start marker seen");
        }

        if let Some(diag) = &mut self.diagnostics {
            diag.record(line);
        }

        let Some(stamped) = self.classifier.extract_timestamp_and_payload(line) else {
            return Ok(None);
        };
        self.clock.arm(stamped.timestamp);

        let Some(kind) = self.classifier.classify(stamped.payload) else {
            return Ok(None);
        };
        self.counts.increment(kind);

        let relative_time = self
            .clock
            .relative_secs(stamped.timestamp)
            .unwrap_or_default();
        tracing::info!(
            kind = kind.column_name(),
            line,
            counts = %self.counts,
            "classified event"
        );

        let record = TimeSeriesRecord {
            relative_time,
            counts: self.counts,
        };
        if let Some(sink) = &mut self.sink {
            sink.write_record(&record)?;
        }
        self.records_written += 1;
        self.last_relative_time = Some(relative_time);
        Ok(Some(record))
    }

    /// Flush the sink and diagnostic log, and produce the final report.
    pub fn finish(&mut self) -> std::io::Result<SessionReport> {
        if let Some(diag) = &mut self.diagnostics {
            diag.flush();
        }
        if let Some(sink) = &mut self.sink {
            sink.flush()?;
        }
        Ok(self.report())
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            counts: self.counts,
            active: self.active,
            records_written: self.records_written,
            last_relative_time: self.last_relative_time,
        }
    }
}
