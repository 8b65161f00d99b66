/// Logcat line classification: session-start detection, timestamp extraction
/// and mapping of payloads to pipeline stages.
///
/// Benchmark lines look like:
///
/// `I/OMXCodec( 123): 2014-03-02 10:11:12.345678 UTC - Encoding frame 17`
///
/// Everything here is pure; the per-session state lives in `session`.
use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

/// Marker emitted once the device-side codec is initialized.
pub const SESSION_START_MARKER: &str = "init OMX";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// `: <date> <time>.<frac> UTC - <payload>`, or the same stamp at line start.
static STAMPED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|: )(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{1,9}) UTC - (.*)$").unwrap()
});

/// Pipeline stage named by a benchmark log line.
///
/// Declaration order is the column order of the time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FrameInserted,
    EncodeStarted,
    NalEmitted,
    FrameEmitted,
    DecodeStarted,
    FrameDecoded,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::FrameInserted,
        EventKind::EncodeStarted,
        EventKind::NalEmitted,
        EventKind::FrameEmitted,
        EventKind::DecodeStarted,
        EventKind::FrameDecoded,
    ];

    /// Literal payload substring that identifies this stage.
    pub fn marker(self) -> &'static str {
        match self {
            EventKind::FrameInserted => "Inserting frame",
            EventKind::EncodeStarted => "Encoding frame",
            EventKind::NalEmitted => "Emit NAL",
            EventKind::FrameEmitted => "Emit frame",
            EventKind::DecodeStarted => "will decode len",
            EventKind::FrameDecoded => "Decoded frame",
        }
    }

    /// Column name in the time-series header.
    pub fn column_name(self) -> &'static str {
        match self {
            EventKind::FrameInserted => "inserted",
            EventKind::EncodeStarted => "encode",
            EventKind::NalEmitted => "encoded",
            EventKind::FrameEmitted => "encoded_frame",
            EventKind::DecodeStarted => "decode",
            EventKind::FrameDecoded => "decoded",
        }
    }

    /// Position in declaration order.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A line that carried a parseable log timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<'a> {
    pub timestamp: NaiveDateTime,
    pub payload: &'a str,
}

/// Classifier settings. The only knob is the optional date-prefix sanity
/// filter (e.g. `"2014"`) that old benchmark logs were matched against.
#[derive(Debug, Clone, Default)]
pub struct LogClassifier {
    date_prefix: Option<String>,
}

impl LogClassifier {
    pub fn new(date_prefix: Option<String>) -> Self {
        Self { date_prefix }
    }

    pub fn is_session_start(&self, line: &str) -> bool {
        is_session_start(line)
    }

    /// Extract the stamp and payload, applying the date-prefix filter if set.
    pub fn extract_timestamp_and_payload<'a>(&self, line: &'a str) -> Option<Stamped<'a>> {
        let caps = STAMPED_LINE.captures(line)?;
        let stamp = caps.get(1)?.as_str();
        if let Some(prefix) = &self.date_prefix {
            if !stamp.starts_with(prefix.as_str()) {
                return None;
            }
        }
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        let payload = caps.get(2)?.as_str();
        Some(Stamped { timestamp, payload })
    }

    pub fn classify(&self, payload: &str) -> Option<EventKind> {
        classify(payload)
    }
}

/// True iff the line carries the session-start marker.
pub fn is_session_start(line: &str) -> bool {
    line.contains(SESSION_START_MARKER)
}

/// Map a payload to its stage. First match in declaration order wins.
pub fn classify(payload: &str) -> Option<EventKind> {
    EventKind::ALL
        .into_iter()
        .find(|kind| payload.contains(kind.marker()))
}
