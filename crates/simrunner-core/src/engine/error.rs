use crate::core::process::ProcessError;
use thiserror::Error;

/// The broad category of a [`RunnerError`], for callers that branch on the
/// kind of misuse rather than the exact message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Value,
    Range,
    State,
    Empty,
    Process,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Invalid process '{name}': {reason}")]
    InvalidHandle { name: String, reason: String },

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },

    #[error("Index {index} is out of range for {len} process(es)")]
    IndexOutOfRange { index: isize, len: usize },

    #[error("Invalid process state for '{name}': {reason}")]
    InvalidState { name: String, reason: String },

    #[error("The runner contains no processes")]
    Empty,

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl RunnerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunnerError::InvalidHandle { .. } => ErrorKind::Type,
            RunnerError::InvalidValue { .. } => ErrorKind::Value,
            RunnerError::IndexOutOfRange { .. } => ErrorKind::Range,
            RunnerError::InvalidState { .. } => ErrorKind::State,
            RunnerError::Empty => ErrorKind::Empty,
            RunnerError::Process(_) => ErrorKind::Process,
        }
    }
}
