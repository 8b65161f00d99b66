/// Tab-separated time series of cumulative per-stage counts.
///
/// Format: one header line `TIME\t<col>\t...`, then one line per classified
/// event: relative seconds with six decimals followed by every counter in
/// `EventKind` declaration order.
use crate::classify::EventKind;
use crate::session::CounterSnapshot;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// One classified event: elapsed session time and the counts after it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    pub relative_time: f64,
    pub counts: CounterSnapshot,
}

/// Writer for the time-series format. The header is written on construction.
pub struct TimeSeriesWriter<W: Write> {
    out: W,
}

impl<W: Write> TimeSeriesWriter<W> {
    pub fn new(mut out: W) -> std::io::Result<Self> {
        out.write_all(header_line().as_bytes())?;
        Ok(Self { out })
    }

    pub fn write_record(&mut self, record: &TimeSeriesRecord) -> std::io::Result<()> {
        let mut line = format!("{:.6}", record.relative_time);
        for count in record.counts.values() {
            line.push('\t');
            line.push_str(&count.to_string());
        }
        line.push('\n');
        self.out.write_all(line.as_bytes())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

/// Sink type handed to the collector.
pub type TimeSeriesSink = TimeSeriesWriter<Box<dyn Write + Send>>;

/// Create (truncate) a time-series file and write its header.
pub fn create_file(path: &Path) -> Result<TimeSeriesSink, TimeSeriesError> {
    let file = std::fs::File::create(path).map_err(|e| TimeSeriesError::Create {
        path: path.to_path_buf(),
        source: e,
    })?;
    let out: Box<dyn Write + Send> = Box::new(std::io::BufWriter::new(file));
    TimeSeriesWriter::new(out).map_err(|e| TimeSeriesError::Create {
        path: path.to_path_buf(),
        source: e,
    })
}

fn header_line() -> String {
    let mut header = String::from("TIME");
    for kind in EventKind::ALL {
        header.push('\t');
        header.push_str(kind.column_name());
    }
    header.push('\n');
    header
}

/// Errors produced while creating or reading a time-series file.
#[derive(Debug)]
pub enum TimeSeriesError {
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    Io(std::io::Error),
    MissingHeader,
    UnexpectedHeader {
        found: String,
    },
    Malformed {
        line: usize,
        reason: String,
    },
}

impl std::fmt::Display for TimeSeriesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSeriesError::Create { path, source } => {
                write!(
                    f,
                    "failed to create time series {}: {}",
                    path.display(),
                    source
                )
            }
            TimeSeriesError::Io(e) => write!(f, "I/O error: {e}"),
            TimeSeriesError::MissingHeader => write!(f, "time series has no header line"),
            TimeSeriesError::UnexpectedHeader { found } => {
                write!(f, "unexpected time series header: {found:?}")
            }
            TimeSeriesError::Malformed { line, reason } => {
                write!(f, "malformed record on line {line}: {reason}")
            }
        }
    }
}

impl std::error::Error for TimeSeriesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimeSeriesError::Create { source, .. } => Some(source),
            TimeSeriesError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TimeSeriesError {
    fn from(e: std::io::Error) -> Self {
        TimeSeriesError::Io(e)
    }
}

/// Read back every record of a time series, in file order.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<TimeSeriesRecord>, TimeSeriesError> {
    let mut lines = reader.lines();
    let header = lines.next().ok_or(TimeSeriesError::MissingHeader)??;
    if format!("{header}\n") != header_line() {
        return Err(TimeSeriesError::UnexpectedHeader { found: header });
    }

    let mut records = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        // Header is line 1
        records.push(parse_record(&line, idx + 2)?);
    }
    Ok(records)
}

/// Open and read a time-series file.
pub fn read_file(path: &Path) -> Result<Vec<TimeSeriesRecord>, TimeSeriesError> {
    let file = std::fs::File::open(path)?;
    read_records(std::io::BufReader::new(file))
}

fn parse_record(line: &str, line_no: usize) -> Result<TimeSeriesRecord, TimeSeriesError> {
    let malformed = |reason: String| TimeSeriesError::Malformed {
        line: line_no,
        reason,
    };

    let mut fields = line.split('\t');
    let time_field = fields.next().unwrap_or_default();
    let relative_time: f64 = time_field
        .parse()
        .map_err(|_| malformed(format!("bad time {time_field:?}")))?;

    let mut values = [0u64; EventKind::ALL.len()];
    let mut found = 0;
    for field in fields {
        if found == values.len() {
            return Err(malformed("too many columns".to_string()));
        }
        values[found] = field
            .parse()
            .map_err(|_| malformed(format!("bad count {field:?}")))?;
        found += 1;
    }
    if found != values.len() {
        return Err(malformed(format!(
            "expected {} counts, found {found}",
            values.len()
        )));
    }

    Ok(TimeSeriesRecord {
        relative_time,
        counts: CounterSnapshot::from_values(values),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(relative_time: f64, values: [u64; 6]) -> TimeSeriesRecord {
        TimeSeriesRecord {
            relative_time,
            counts: CounterSnapshot::from_values(values),
        }
    }

    #[test]
    fn test_header_is_exact() {
        let mut buf = Vec::new();
        TimeSeriesWriter::new(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "TIME\tinserted\tencode\tencoded\tencoded_frame\tdecode\tdecoded\n"
        );
    }

    #[test]
    fn test_record_line_format() {
        let mut buf = Vec::new();
        let mut writer = TimeSeriesWriter::new(&mut buf).unwrap();
        writer.write_record(&record(1.5, [1, 1, 0, 0, 0, 0])).unwrap();
        writer.write_record(&record(0.0, [12, 3, 4, 5, 6, 700])).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(lines[0], "1.500000\t1\t1\t0\t0\t0\t0");
        assert_eq!(lines[1], "0.000000\t12\t3\t4\t5\t6\t700");
    }

    #[test]
    fn test_file_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.tsv");
        let written = vec![
            record(0.0, [1, 0, 0, 0, 0, 0]),
            record(0.033367, [1, 1, 0, 0, 0, 0]),
            record(0.041, [1, 1, 1, 0, 0, 0]),
            record(1.5, [1, 1, 1, 1, 0, 0]),
            record(12.000001, [2, 1, 1, 1, 1, 1]),
        ];

        let mut sink = create_file(&path).unwrap();
        for r in &written {
            sink.write_record(r).unwrap();
        }
        sink.flush().unwrap();
        drop(sink);

        assert_eq!(read_file(&path).unwrap(), written);
    }

    #[test]
    fn test_read_header_only() {
        let text = "TIME\tinserted\tencode\tencoded\tencoded_frame\tdecode\tdecoded\n";
        assert!(read_records(text.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_read_empty_is_missing_header() {
        let err = read_records("".as_bytes()).unwrap_err();
        assert!(matches!(err, TimeSeriesError::MissingHeader));
    }

    #[test]
    fn test_read_wrong_header() {
        let err = read_records("TIME\ta\tb\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TimeSeriesError::UnexpectedHeader { .. }));
    }

    #[test]
    fn test_read_malformed_records() {
        let header = "TIME\tinserted\tencode\tencoded\tencoded_frame\tdecode\tdecoded\n";

        let short = format!("{header}0.5\t1\t2\n");
        let err = read_records(short.as_bytes()).unwrap_err();
        assert!(matches!(err, TimeSeriesError::Malformed { line: 2, .. }));

        let bad_time = format!("{header}soon\t1\t1\t1\t1\t1\t1\n");
        assert!(read_records(bad_time.as_bytes()).is_err());

        let negative = format!("{header}0.1\t1\t-1\t1\t1\t1\t1\n");
        assert!(read_records(negative.as_bytes()).is_err());

        let long = format!("{header}0.1\t1\t1\t1\t1\t1\t1\t1\n");
        assert!(read_records(long.as_bytes()).is_err());
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let err = create_file(Path::new("/nonexistent-dir/run.tsv"))
            .err()
            .unwrap();
        assert!(matches!(err, TimeSeriesError::Create { .. }));
    }
}
