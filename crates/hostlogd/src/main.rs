//! hostlogd - host telemetry collector daemon.
//!
//! Samples CPU, memory, disk, network and platform sensors at a fixed
//! interval and appends one CSV row per pass to a daily store file.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Releases unused memory back to the operating system.
#[cfg(not(target_env = "msvc"))]
fn release_memory_to_os() {
    // SAFETY: mallctl with a valid NUL-terminated name and no in/out buffers.
    unsafe {
        tikv_jemalloc_sys::mallctl(
            c"arena.0.purge".as_ptr().cast(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            0,
        );
    }
}

#[cfg(target_env = "msvc")]
fn release_memory_to_os() {}

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use hostlog_core::assembler::Assembler;
use hostlog_core::collector::procfs::ProcessReader;
use hostlog_core::collector::{FileSystem, RealFs, SystemCommands};
use hostlog_core::platform::{PlatformDetector, detect_once};
use hostlog_core::probe::{ProbeConfig, ProbeSet};
use hostlog_core::process::DEFAULT_TOP_K;
use hostlog_core::sample::{SCHEMA_VERSION, Sample};
use hostlog_core::scheduler::{RunSummary, Scheduler, SystemClock};
use hostlog_core::storage::{CsvSink, SinkError};

/// Samples between two memory stats log lines.
const MEMORY_STATS_EVERY: u64 = 60;

/// Host telemetry collector daemon.
#[derive(Parser)]
#[command(name = "hostlogd", about = "Host telemetry collector daemon", version)]
struct Args {
    /// Sampling interval in seconds.
    #[arg(short, long, env = "HOSTLOG_INTERVAL", default_value = "60",
          value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Output directory for the CSV store.
    #[arg(short, long, env = "HOSTLOG_OUTPUT_DIR", default_value = "./data")]
    output_dir: String,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, env = "HOSTLOG_PROC_PATH", default_value = "/proc")]
    proc_path: String,

    /// Path to /sys filesystem (for testing/mocking).
    #[arg(long, env = "HOSTLOG_SYS_PATH", default_value = "/sys")]
    sys_path: String,

    /// Mount point whose filesystem usage is reported.
    #[arg(long, env = "HOSTLOG_DISK_PATH", default_value = "/")]
    disk_path: String,

    /// Number of raw process candidates kept before folding by name.
    #[arg(long, env = "HOSTLOG_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Do not rank processes.
    #[arg(long, env = "HOSTLOG_NO_PROCESSES")]
    no_processes: bool,

    /// Do not read hwmon temperature sensors.
    #[arg(long, env = "HOSTLOG_NO_SENSORS")]
    no_sensors: bool,

    /// Timeout for external commands (vcgencmd, pinctrl) in seconds.
    #[arg(long, env = "HOSTLOG_COMMAND_TIMEOUT", default_value = "3")]
    command_timeout: u64,

    /// Stop after this many samples.
    #[arg(long, env = "HOSTLOG_COUNT")]
    count: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            proc_path: self.proc_path.clone(),
            sys_path: self.sys_path.clone(),
            disk_path: self.disk_path.clone(),
            top_k: self.top_k,
            processes: !self.no_processes,
            sensors: !self.no_sensors,
            command_timeout: Duration::from_secs(self.command_timeout),
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["hostlogd", "hostlog_core"] {
        match format!("{}={}", target, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Summarises a sample and the pass that produced it for logging.
fn describe_sample(sample: &Sample, probes: &ProbeSet) -> String {
    let failed: Vec<&str> = probes
        .last_outcomes()
        .iter()
        .filter(|o| o.failure.is_some())
        .map(|o| o.name)
        .collect();

    let mut desc = format!(
        "{}/{} fields in {:?}",
        sample.present_count(),
        sample.values().len(),
        probes.last_total()
    );
    if !failed.is_empty() {
        desc.push_str(&format!(", failed: {}", failed.join(", ")));
    }
    desc
}

/// Describes the daemon's own resident memory.
fn describe_memory<F: FileSystem>(reader: &ProcessReader<F>, rows_written: u64) -> String {
    match reader.read_self_memory() {
        Ok(m) => format!(
            "rss={} kB, peak_rss={} kB, rows_written={}",
            m.rss_kb, m.peak_kb, rows_written
        ),
        Err(e) => format!("unavailable ({}), rows_written={}", e, rows_written),
    }
}

/// Errors to report on shutdown, the one that ended the run first.
fn shutdown_errors(
    result: &Result<RunSummary, SinkError>,
    closed: &Result<(), SinkError>,
) -> Vec<String> {
    let mut errors = Vec::new();
    if let Err(e) = result {
        errors.push(format!("Fatal store error: {}", e));
    }
    if let Err(e) = closed {
        errors.push(format!("Failed to close store on shutdown: {}", e));
    }
    errors
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("hostlogd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, output={}, proc={}, sys={}, disk={}",
        args.interval, args.output_dir, args.proc_path, args.sys_path, args.disk_path
    );

    let fs = RealFs::new();
    let self_reader = ProcessReader::new(fs, args.proc_path.clone());
    let profile = detect_once(&PlatformDetector::new(fs, &args.proc_path, &args.sys_path));
    info!("Platform: {}", profile);

    let probes = ProbeSet::build(profile, &args.probe_config(), fs, SystemCommands::new());
    let mut assembler = match Assembler::new(probes) {
        Ok(a) => a,
        Err(e) => {
            error!("Invalid sample schema: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Schema v{}: {} fields",
        SCHEMA_VERSION,
        assembler.schema().len()
    );

    let mut sink = match CsvSink::new(&args.output_dir, profile.machine.clone()) {
        Ok(s) => s,
        Err(e) => {
            error!("Cannot open store: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Storage initialized at {}", args.output_dir);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut scheduler = Scheduler::new(SystemClock, Duration::from_secs(args.interval));
    if let Some(n) = args.count {
        scheduler = scheduler.with_max_ticks(n);
    }

    let mut sample_count: u64 = 0;
    let mut current_day: Option<NaiveDate> = None;

    info!("Starting collection loop");

    let result = scheduler.run(&running, || {
        let sample = assembler.assemble();
        sink.append(&sample)?;
        sample_count += 1;

        info!(
            "Sample #{}: {}",
            sample_count,
            describe_sample(&sample, assembler.probes())
        );
        for outcome in assembler.probes().last_outcomes() {
            debug!("probe {} took {:?}", outcome.name, outcome.duration);
        }

        // Log memory stats every 60 samples (an hour at the default interval)
        if sample_count.is_multiple_of(MEMORY_STATS_EVERY) {
            info!(
                "Memory stats: {}",
                describe_memory(&self_reader, sink.rows_written())
            );
        }

        let day = sample.captured_at().date_naive();
        if current_day.is_some_and(|d| d != day) {
            if let Some(path) = sink.current_path() {
                info!("New day, now writing {}", path.display());
            }
            release_memory_to_os();
        }
        current_day = Some(day);
        Ok(())
    });

    // Graceful shutdown
    info!("Shutting down...");

    let closed = sink.close();
    info!("Memory stats: {}", describe_memory(&self_reader, sink.rows_written()));

    let errors = shutdown_errors(&result, &closed);
    for e in &errors {
        error!("{}", e);
    }
    match result {
        Ok(summary) if errors.is_empty() => {
            info!(
                "Shutdown complete: {} samples, {} overruns",
                summary.ticks, summary.overruns
            );
            ExitCode::SUCCESS
        }
        _ => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostlog_core::collector::MockFs;
    use hostlog_core::probe::{Probe, ProbeFailure, ProbeResult, Readings};
    use std::path::PathBuf;

    struct Flaky(bool);

    impl Probe for Flaky {
        fn name(&self) -> &'static str {
            if self.0 { "good" } else { "bad" }
        }

        fn fields(&self) -> Vec<String> {
            vec![format!("{}_value", self.name())]
        }

        fn sample(&mut self) -> ProbeResult {
            if self.0 {
                let mut r = Readings::new();
                r.set("good_value", 1.0);
                ProbeResult::Ok(r)
            } else {
                ProbeResult::Failed(ProbeFailure::error("broken"))
            }
        }
    }

    #[test]
    fn describe_sample_lists_failed_probes() {
        let mut set = ProbeSet::new();
        set.push(Box::new(Flaky(true)));
        set.push(Box::new(Flaky(false)));
        let mut assembler = Assembler::new(set).unwrap();

        let sample = assembler.assemble();
        let desc = describe_sample(&sample, assembler.probes());

        assert!(desc.starts_with("2/3 fields"));
        assert!(desc.contains("failed: bad"));
    }

    #[test]
    fn args_defaults_and_overrides() {
        let args = Args::parse_from(["hostlogd"]);
        assert_eq!(args.interval, 60);
        assert_eq!(args.top_k, 10);
        assert!(args.count.is_none());

        let config = Args::parse_from(["hostlogd", "--no-processes", "--command-timeout", "5"])
            .probe_config();
        assert!(!config.processes);
        assert!(config.sensors);
        assert_eq!(config.command_timeout, Duration::from_secs(5));

        assert!(Args::try_parse_from(["hostlogd", "--interval", "0"]).is_err());
    }

    #[test]
    fn probe_config_builds_against_mock_host() {
        let fs = MockFs::typical_system();
        let args = Args::parse_from(["hostlogd", "--top-k", "3", "--no-sensors"]);
        let profile = PlatformDetector::new(fs.clone(), "/proc", "/sys").detect();

        let set = ProbeSet::build(
            &profile,
            &args.probe_config(),
            fs,
            hostlog_core::collector::MockCommands::new(),
        );
        let assembler = Assembler::new(set).unwrap();
        assert!(assembler.schema().position("top_cpu_3_pct").is_some());
        assert!(assembler.schema().position("top_cpu_4_pct").is_none());
    }

    #[test]
    fn describe_memory_reads_own_status() {
        let fs = MockFs::typical_system();
        let reader = ProcessReader::new(fs.clone(), "/proc");

        assert_eq!(
            describe_memory(&reader, 42),
            "rss=6144 kB, peak_rss=7168 kB, rows_written=42"
        );

        fs.remove("/proc/self/status");
        let desc = describe_memory(&reader, 0);
        assert!(desc.starts_with("unavailable ("));
        assert!(desc.ends_with("rows_written=0"));
    }

    #[test]
    fn shutdown_reports_run_error_before_close_error() {
        let run_failed: Result<RunSummary, SinkError> = Err(SinkError::HeaderMismatch {
            path: PathBuf::from("data/params_x86_64_Jan_15_2024.csv"),
        });
        let close_failed: Result<(), SinkError> = Err(SinkError::HeaderMismatch {
            path: PathBuf::from("data/params_x86_64_Jan_16_2024.csv"),
        });

        let errors = shutdown_errors(&run_failed, &close_failed);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Fatal store error"));
        assert!(errors[0].contains("Jan_15"));
        assert!(errors[1].starts_with("Failed to close store"));

        assert_eq!(shutdown_errors(&run_failed, &Ok(())).len(), 1);
        assert!(shutdown_errors(&Ok(RunSummary::default()), &Ok(())).is_empty());
    }
}
