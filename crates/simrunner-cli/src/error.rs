use simrunner::core::io::manifest::ManifestError;
use simrunner::core::io::report::ReportError;
use simrunner::engine::error::RunnerError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("{failed} of {total} process(es) ended in an error state")]
    JobsFailed { failed: usize, total: usize },

    #[error("Run interrupted; all processes were killed")]
    Interrupted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
