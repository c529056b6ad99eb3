// ==============================================================================
// logging.rs - Per-Run Logging
// ==============================================================================
// Description: Tracing subscriber scoped to a single propagation run
// Author: Matt Barham
// Created: 2026-09-24
// Modified: 2026-10-10
// Version: 1.0.1
// ==============================================================================

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};
use uuid::Uuid;

use crate::error::PropagationError;

/// Filter used when RUST_LOG is not set
pub const DEFAULT_FILTER: &str = "network_propagator=info";

/// Builds the subscriber of one run and installs it only for that run.
///
/// Nothing is registered globally, so runs in the same process (tests, or a
/// host embedding the library) keep separate log destinations.
#[derive(Debug, Clone)]
pub struct RunLogger {
    log_file: Option<PathBuf>,
    filter: Option<String>,
    stderr: bool,
}

impl Default for RunLogger {
    fn default() -> Self {
        Self {
            log_file: None,
            filter: None,
            stderr: true,
        }
    }
}

impl RunLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append log lines to a file as well, without ANSI colors
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Explicit filter directives instead of RUST_LOG
    pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
        self.filter = Some(directives.into());
        self
    }

    pub fn without_stderr(mut self) -> Self {
        self.stderr = false;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        }
    }

    /// Run `f` with this logger installed, inside a `propagation_run` span
    pub fn scoped<T>(&self, run_id: Uuid, f: impl FnOnce() -> T) -> Result<T, PropagationError> {
        let file_layer = match &self.log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| PropagationError::OutputIo {
                        path: path.clone(),
                        source,
                    })?;
                Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            }
            None => None,
        };

        let stderr_layer = self
            .stderr
            .then(|| fmt::layer().with_writer(std::io::stderr));

        let subscriber = tracing_subscriber::registry()
            .with(self.env_filter())
            .with(stderr_layer)
            .with(file_layer);

        Ok(tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("propagation_run", run_id = %run_id);
            let _entered = span.enter();
            f()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_file_receives_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let run_id = Uuid::new_v4();

        let logger = RunLogger::new()
            .with_log_file(&path)
            .with_filter(DEFAULT_FILTER)
            .without_stderr();
        let value = logger
            .scoped(run_id, || {
                tracing::info!("Loaded 12 nodes");
                tracing::debug!("filtered out");
                7
            })
            .unwrap();
        assert_eq!(value, 7);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Loaded 12 nodes"));
        assert!(contents.contains(&run_id.to_string()));
        assert!(!contents.contains("filtered out"));
        assert!(!contents.contains("\x1b["));
    }

    #[test]
    fn test_runs_do_not_share_files() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.log");
        let second = dir.path().join("second.log");

        RunLogger::new()
            .with_log_file(&first)
            .with_filter(DEFAULT_FILTER)
            .without_stderr()
            .scoped(Uuid::new_v4(), || tracing::info!("first run"))
            .unwrap();
        RunLogger::new()
            .with_log_file(&second)
            .with_filter(DEFAULT_FILTER)
            .without_stderr()
            .scoped(Uuid::new_v4(), || tracing::info!("second run"))
            .unwrap();

        let second_contents = std::fs::read_to_string(&second).unwrap();
        assert!(second_contents.contains("second run"));
        assert!(!second_contents.contains("first run"));
    }

    #[test]
    fn test_unwritable_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("run.log");

        let err = RunLogger::new()
            .with_log_file(&path)
            .without_stderr()
            .scoped(Uuid::new_v4(), || ())
            .unwrap_err();
        assert!(matches!(err, PropagationError::OutputIo { .. }));
    }
}
