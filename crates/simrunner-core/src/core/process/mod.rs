//! Provides the process abstraction consumed by the scheduler.
//!
//! A [`JobHandle`] is one long-running external simulation. The scheduler never
//! inspects what a handle runs; it only starts, polls, waits on and kills it, and
//! uses its working directory to keep each job's artifacts apart.

pub mod engine;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Process '{name}' is already running")]
    AlreadyRunning { name: String },

    #[error("Failed to spawn process '{name}' ({exe}): {source}")]
    Spawn {
        name: String,
        exe: String,
        source: std::io::Error,
    },

    #[error("I/O error for process '{name}' at '{path}': {source}", path = path.display())]
    Io {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to kill process '{name}': {source}")]
    Kill {
        name: String,
        source: std::io::Error,
    },

    #[error("Process '{name}' cannot be relocated: {reason}")]
    Relocation { name: String, reason: String },
}

/// A single long-running external job managed by a runner.
///
/// Every method takes `&self`: implementors synchronize internally so that a
/// background scheduler and the owning caller can both hold the handle.
pub trait JobHandle: Send + Sync + fmt::Debug {
    /// A human-readable label for the job.
    fn name(&self) -> &str;

    /// The engine package that executes the job (e.g. `"GROMACS"`).
    fn package_name(&self) -> &str;

    /// The directory that receives the job's artifacts.
    fn work_dir(&self) -> &Path;

    /// Begins external execution.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::AlreadyRunning`] if the job has not exited yet, or
    /// an error describing why the external process could not be launched. A
    /// launch failure also leaves the handle in an error state.
    fn start(&self) -> Result<(), ProcessError>;

    /// Blocks until the external execution completes. Returns immediately if the
    /// job is not running.
    fn wait(&self);

    /// Terminates the job. Killing a job that is not running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the termination signal could not be delivered. Callers
    /// treat this as best-effort and do not propagate it.
    fn kill(&self) -> Result<(), ProcessError>;

    fn is_running(&self) -> bool;

    /// Whether the most recent attempt ended in failure.
    fn is_error(&self) -> bool;

    /// Cumulative wall-clock execution time across every attempt.
    fn run_time(&self) -> Duration;

    /// Creates a fresh, not-yet-started handle of the same kind whose artifacts
    /// live in `work_dir`.
    fn clone_with_work_dir(&self, work_dir: &Path) -> Result<Arc<dyn JobHandle>, ProcessError>;
}
