use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "omx-bench.toml";

/// Top-level configuration loaded from omx-bench.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct BenchConfig {
    pub adb: AdbConfig,
    pub benchmark: BenchmarkConfig,
    pub timing: TimingConfig,
    pub output: OutputConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    pub command: String,
    /// Target device serial, passed as `-s SERIAL`.
    pub serial: Option<String>,
    /// Extra arguments for `adb logcat` (filter specs, buffers).
    pub logcat_args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Device-side benchmark launcher script.
    pub script: String,
    /// Device-side video file fed to the encoder.
    pub file: String,
    pub frames: u32,
    /// Also run the receive (decode) half of the pipeline.
    pub receive: bool,
    /// Appended after the standard flags; `{file}` and `{frames}` are substituted.
    pub extra_args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait between starting the collector and launching the benchmark.
    pub settle_secs: u64,
    /// Wait after the benchmark returns, so trailing log lines are collected.
    pub drain_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct OutputConfig {
    pub time_series: Option<PathBuf>,
    pub debug_log: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ClassifierConfig {
    /// Only accept log stamps starting with this prefix (e.g. "2014").
    pub date_prefix: Option<String>,
}

// --- Default implementations ---

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            command: "adb".to_string(),
            serial: None,
            logcat_args: Vec::new(),
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            script: "/data/b2g-benchmark.sh".to_string(),
            file: "/data/niklas_176x144_30.y4m".to_string(),
            frames: 300,
            receive: true,
            extra_args: Vec::new(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_secs: 2,
            drain_secs: 10,
        }
    }
}

impl AdbConfig {
    /// `-s SERIAL` when a serial is configured, otherwise nothing.
    pub fn device_args(&self) -> Vec<String> {
        match &self.serial {
            Some(serial) => vec!["-s".to_string(), serial.clone()],
            None => Vec::new(),
        }
    }
}

/// Errors produced while loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl BenchConfig {
    /// Load config from an explicit path (must exist), or from
    /// `omx-bench.toml` in the working directory if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_legacy_driver() {
        let config = BenchConfig::default();
        assert_eq!(config.adb.command, "adb");
        assert_eq!(config.benchmark.frames, 300);
        assert!(config.benchmark.receive);
        assert_eq!(config.benchmark.file, "/data/niklas_176x144_30.y4m");
        assert_eq!(config.timing.settle_secs, 2);
        assert_eq!(config.timing.drain_secs, 10);
        assert!(config.output.time_series.is_none());
        assert!(config.classifier.date_prefix.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("omx-bench.toml");
        std::fs::write(
            &path,
            r#"
[adb]
serial = "emulator-5554"

[benchmark]
frames = 60
receive = false

[output]
time_series = "run.tsv"

[classifier]
date_prefix = "2014"
"#,
        )
        .unwrap();

        let config = BenchConfig::load(Some(&path)).unwrap();
        assert_eq!(config.adb.command, "adb");
        assert_eq!(config.adb.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(config.benchmark.frames, 60);
        assert!(!config.benchmark.receive);
        assert_eq!(config.benchmark.script, "/data/b2g-benchmark.sh");
        assert_eq!(config.timing.drain_secs, 10);
        assert_eq!(config.output.time_series, Some(PathBuf::from("run.tsv")));
        assert_eq!(config.classifier.date_prefix.as_deref(), Some("2014"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = BenchConfig::load(Some(Path::new("/nonexistent/omx-bench.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("failed to read config"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[timing]\nsettle_secs = \"soon\"\n").unwrap();
        let err = BenchConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_device_args() {
        let mut adb = AdbConfig::default();
        assert!(adb.device_args().is_empty());
        adb.serial = Some("abc".to_string());
        assert_eq!(adb.device_args(), vec!["-s", "abc"]);
    }
}
