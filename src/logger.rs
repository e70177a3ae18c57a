//! Console and file logging.
//!
//! Stampede logs through the [`log`](https://docs.rs/log) facade, backed by
//! [`simplelog`](https://docs.rs/simplelog). Output verbosity is controlled with `-v`
//! and `-q`; an optional log file is enabled with `--log-file` and its verbosity is
//! raised with `-g`.
//!
//! | flags | stdout | log file |
//! |-------|--------|----------|
//! | (none) | INFO | WARN |
//! | `-q` | WARN | |
//! | `-v` / `-g` | DEBUG | INFO |
//! | `-vv` / `-gg` | TRACE | DEBUG |
//! | `-ggg` | | TRACE |

use simplelog::*;
use std::path::PathBuf;

use crate::config::LoadTestConfiguration;

impl LoadTestConfiguration {
    /// Console verbosity implied by `--verbose` and `--quiet`.
    pub(crate) fn stdout_level(&self) -> LevelFilter {
        match self.verbose {
            0 => match self.quiet {
                0 => LevelFilter::Info,
                _ => LevelFilter::Warn,
            },
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Log file verbosity implied by `--log-level`.
    pub(crate) fn log_file_level(&self) -> LevelFilter {
        match self.log_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Optionally initialize the logger which writes to standard out and/or to
    /// a configurable log file.
    ///
    /// Only the first call in a process installs a logger, later calls are logged and
    /// otherwise ignored.
    pub(crate) fn initialize_logger(&self) {
        let debug_level = self.stdout_level();
        let log_level = self.log_file_level();

        // Open the log file if configured.
        let log_file: Option<PathBuf> = if !self.log_file.is_empty() {
            Some(PathBuf::from(&self.log_file))
        // Otherwise disable the log.
        } else {
            None
        };

        let mut loggers: Vec<Box<dyn SharedLogger>> =
            vec![SimpleLogger::new(debug_level, Config::default())];
        if let Some(log_to_file) = log_file.as_ref() {
            match std::fs::File::create(log_to_file) {
                Ok(file) => loggers.push(WriteLogger::new(log_level, Config::default(), file)),
                Err(e) => eprintln!(
                    "failed to create log file {}: {}",
                    log_to_file.display(),
                    e
                ),
            }
        }
        let file_enabled = loggers.len() > 1;

        match CombinedLogger::init(loggers) {
            Ok(_) => (),
            Err(e) => {
                info!("failed to initialize CombinedLogger: {}", e);
            }
        }

        if let (Some(log_to_file), true) = (log_file, file_enabled) {
            info!("Writing to log file: {}", log_to_file.display());
        }
        info!("Output verbosity level: {}", debug_level);
        info!("Logfile verbosity level: {}", log_level);
    }
}
