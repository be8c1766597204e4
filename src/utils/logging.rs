//! Logging Utilities
//!
//! File-based and console logging.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CRATE_TARGET: &str = "streamdecode";

/// Get the log file path
pub fn get_log_file_path() -> PathBuf {
    super::get_app_data_dir().join("streamdecode.log")
}

/// Simple file logger
pub struct FileLogger {
    file: Mutex<Option<File>>,
    console: bool,
    /// Most verbose level let through for this crate's targets
    crate_level: Level,
}

impl FileLogger {
    pub fn new(console: bool, verbose: bool) -> Self {
        Self::with_file(Self::open_log_file(&get_log_file_path()), console, verbose)
    }

    fn with_file(file: Option<File>, console: bool, verbose: bool) -> Self {
        Self {
            file: Mutex::new(file),
            console,
            crate_level: if verbose { Level::Debug } else { Level::Info },
        }
    }

    fn open_log_file(path: &Path) -> Option<File> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            let _ = super::ensure_dir(parent);
        }

        OpenOptions::new().create(true).append(true).open(path).ok()
    }

    fn passes(&self, target: &str, level: Level) -> bool {
        if target.starts_with(CRATE_TARGET) {
            level <= self.crate_level
        } else {
            // External crates: WARN and ERROR only
            level <= Level::Warn
        }
    }

    fn format_line(record: &Record) -> String {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        format!(
            "[{}] {} {} - {}\n",
            timestamp,
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.passes(metadata.target(), metadata.level())
    }

    fn log(&self, record: &Record) {
        if !self.passes(record.target(), record.level()) {
            return;
        }

        let line = Self::format_line(record);

        // Write to file
        if let Ok(mut guard) = self.file.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.write_all(line.as_bytes());
            }
        }

        // Write to console if enabled
        if self.console {
            print!("{}", line);
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(ref mut file) = *guard {
                let _ = file.flush();
            }
        }
    }
}

/// Initialize the logging system
///
/// Everything goes to the log file; `console` mirrors it to stdout.
pub fn init_logging(console: bool, verbose: bool) -> Result<(), log::SetLoggerError> {
    let logger = Box::new(FileLogger::new(console, verbose));
    log::set_boxed_logger(logger)?;
    log::set_max_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    Ok(())
}
