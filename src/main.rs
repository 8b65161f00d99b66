mod bench;
mod classify;
mod collector;
mod config;
mod driver;
mod logcat;
mod session;
mod timeseries;

use clap::Parser;
use config::BenchConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Drive the on-device OMX video benchmark over adb, follow logcat, and
/// count pipeline events (inserted, encoded, NAL emitted, decoded ...) on a
/// clock relative to codec initialization.
#[derive(Parser, Debug)]
#[command(name = "omx-bench", version, about)]
pub struct Cli {
    /// Config file path (default: ./omx-bench.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the per-event time series (TSV) to this file
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write every raw logcat line after codec init to this file
    #[arg(long)]
    debug: Option<PathBuf>,

    /// Number of frames to benchmark
    #[arg(long)]
    frames: Option<u32>,

    /// Device-side video file
    #[arg(long)]
    file: Option<String>,

    /// Don't run the receive (decode) side
    #[arg(long)]
    no_recv: bool,

    /// Device serial (adb -s)
    #[arg(short, long)]
    serial: Option<String>,

    /// Seconds to wait before launching the benchmark
    #[arg(long)]
    settle: Option<u64>,

    /// Seconds to keep collecting after the benchmark returns
    #[arg(long)]
    drain: Option<u64>,

    /// Only accept log timestamps starting with this prefix (e.g. 2014)
    #[arg(long)]
    date_prefix: Option<String>,

    /// Print resolved settings and the benchmark command, don't run
    #[arg(long)]
    dry_run: bool,

    /// Summarize an existing time-series file and exit
    #[arg(long, value_name = "FILE")]
    inspect: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the file config.
    fn apply(&self, config: &mut BenchConfig) {
        if let Some(out) = &self.out {
            config.output.time_series = Some(out.clone());
        }
        if let Some(debug) = &self.debug {
            config.output.debug_log = Some(debug.clone());
        }
        if let Some(frames) = self.frames {
            config.benchmark.frames = frames;
        }
        if let Some(file) = &self.file {
            config.benchmark.file = file.clone();
        }
        if self.no_recv {
            config.benchmark.receive = false;
        }
        if let Some(serial) = &self.serial {
            config.adb.serial = Some(serial.clone());
        }
        if let Some(settle) = self.settle {
            config.timing.settle_secs = settle;
        }
        if let Some(drain) = self.drain {
            config.timing.drain_secs = drain;
        }
        if let Some(prefix) = &self.date_prefix {
            config.classifier.date_prefix = Some(prefix.clone());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    if let Some(path) = &cli.inspect {
        if let Err(e) = driver::inspect(path) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let mut config = match BenchConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    if cli.dry_run {
        println!("{config:#?}");
        println!("{}", bench::command_line(&config.adb, &config.benchmark));
        return;
    }

    match driver::run(&config).await {
        Ok(report) => driver::print_summary(&report),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
