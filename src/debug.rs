//! Logging bridge for termframe.
//!
//! Routes every `log` record to a debug log file in the temp directory
//! (`termframe_debug.log`), and mirrors it to stderr when `RUST_LOG` is set.
//!
//! The level comes from, highest precedence first:
//! - the `--log-level` flag
//! - `RUST_LOG` (a plain level name such as `debug`)
//! - `DEBUG_LEVEL` (0 = off, 1 = errors, 2 = info, 3 = debug, 4 = trace)
//! - warnings only

use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Debug level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    Off = 0,
    Error = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl DebugLevel {
    fn from_env() -> Option<Self> {
        let val = std::env::var("DEBUG_LEVEL").ok()?;
        match val.trim().parse::<u8>() {
            Ok(0) => Some(DebugLevel::Off),
            Ok(1) => Some(DebugLevel::Error),
            Ok(2) => Some(DebugLevel::Info),
            Ok(3) => Some(DebugLevel::Debug),
            Ok(4) => Some(DebugLevel::Trace),
            _ => None,
        }
    }

    fn filter(self) -> LevelFilter {
        match self {
            DebugLevel::Off => LevelFilter::Off,
            DebugLevel::Error => LevelFilter::Error,
            DebugLevel::Info => LevelFilter::Info,
            DebugLevel::Debug => LevelFilter::Debug,
            DebugLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Resolve the effective level from the CLI flag and the environment.
pub fn resolve_level(
    cli: Option<LevelFilter>,
    rust_log: Option<&str>,
    debug_level: Option<DebugLevel>,
) -> LevelFilter {
    cli.or_else(|| rust_log.and_then(|s| s.trim().parse().ok()))
        .or_else(|| debug_level.map(DebugLevel::filter))
        .unwrap_or(LevelFilter::Warn)
}

pub fn log_path() -> PathBuf {
    std::env::temp_dir().join("termframe_debug.log")
}

struct LogBridge {
    file: Mutex<Option<std::fs::File>>,
    stderr: bool,
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{}] [{:<5}] [{}] {}\n",
            get_timestamp(),
            record.level(),
            record.target(),
            record.args()
        );
        if let Some(file) = self.file.lock().as_mut() {
            let _ = file.write_all(line.as_bytes());
        }
        if self.stderr {
            eprint!("{line}");
        }
    }

    fn flush(&self) {
        if let Some(file) = self.file.lock().as_mut() {
            let _ = file.flush();
        }
    }
}

static LOGGER: OnceLock<LogBridge> = OnceLock::new();

fn get_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:06}", now.as_secs(), now.subsec_micros())
}

/// Install the bridge as the global logger. Later calls are ignored.
pub fn init_log_bridge(cli_level: Option<LevelFilter>) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let level = resolve_level(cli_level, rust_log.as_deref(), DebugLevel::from_env());

    let logger = LOGGER.get_or_init(|| {
        let file = if level == LevelFilter::Off {
            None
        } else {
            // Silently run without a file if it can't be opened
            OpenOptions::new()
                .write(true)
                .truncate(true)
                .create(true)
                .open(log_path())
                .ok()
        };
        let bridge = LogBridge {
            file: Mutex::new(file),
            stderr: rust_log.is_some(),
        };
        if let Some(file) = bridge.file.lock().as_mut() {
            let _ = writeln!(
                file,
                "{}\ntermframe debug session started at {} (level={level})\n{}",
                "=".repeat(80),
                get_timestamp(),
                "=".repeat(80)
            );
        }
        bridge
    });

    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
}
