//! Service Configuration
//!
//! Defaults, overridden by `FLOWRUNNER_*` environment variables, overridden
//! in turn by command-line flags.
//!
//! | Variable                    | Field           |
//! |-----------------------------|-----------------|
//! | `FLOWRUNNER_WORKFLOWS_DIR`  | `workflows_dir` |
//! | `FLOWRUNNER_LOG_FILE`       | `log_file`      |
//! | `FLOWRUNNER_RETENTION_SECS` | `retention`     |
//! | `FLOWRUNNER_POLL_MS`        | `poll_interval` |
//! | `FLOWRUNNER_WORKING_DIR`    | `working_dir`   |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use once_cell::sync::Lazy;

use crate::execution::ExecutorConfig;
use crate::logs::{FileLogSink, LogError, LogSink, MemoryLogSink};

/// Shared log file used when none is configured.
pub static DEFAULT_LOG_FILE: Lazy<PathBuf> =
    Lazy::new(|| std::env::temp_dir().join("flowrunner").join("runs.log"));

/// Default directory searched for workflow definitions.
pub const DEFAULT_WORKFLOWS_DIR: &str = "workflows";

/// Default log polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub workflows_dir: PathBuf,
    /// `None` keeps the run log in memory.
    pub log_file: Option<PathBuf>,
    /// How long finished tasks stay queryable; `None` keeps them forever.
    pub retention: Option<Duration>,
    pub poll_interval: Duration,
    pub working_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workflows_dir: PathBuf::from(DEFAULT_WORKFLOWS_DIR),
            log_file: Some(DEFAULT_LOG_FILE.clone()),
            retention: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            working_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// Unparseable numbers are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("FLOWRUNNER_WORKFLOWS_DIR") {
            config.workflows_dir = PathBuf::from(dir);
        }

        if let Some(file) = lookup("FLOWRUNNER_LOG_FILE") {
            // An empty value selects the in-memory log.
            config.log_file = if file.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(file))
            };
        }

        if let Some(secs) = parse_number("FLOWRUNNER_RETENTION_SECS", &lookup) {
            config.retention = Some(Duration::from_secs(secs));
        }

        if let Some(ms) = parse_number("FLOWRUNNER_POLL_MS", &lookup) {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }

        if let Some(dir) = lookup("FLOWRUNNER_WORKING_DIR") {
            config.working_dir = Some(PathBuf::from(dir));
        }

        debug!("Configuration: {:?}", config);
        config
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            retention: self.retention,
        }
    }

    /// Opens the configured run log.
    pub fn open_sink(&self) -> Result<Arc<dyn LogSink>, LogError> {
        match &self.log_file {
            Some(path) => Ok(Arc::new(FileLogSink::open(path)?)),
            None => Ok(Arc::new(MemoryLogSink::new())),
        }
    }
}

fn parse_number(key: &str, lookup: &impl Fn(&str) -> Option<String>) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a whole number", key, raw);
            None
        }
    }
}
