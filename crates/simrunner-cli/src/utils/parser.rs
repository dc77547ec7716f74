use simrunner::engine::config::RunMode;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Invalid run mode '{0}'. Expected 'serial' or 'parallel'.")]
    InvalidRunMode(String),

    #[error("Invalid poll interval {0}. Expected a finite number of seconds greater than zero.")]
    InvalidPollInterval(f64),

    #[error("Invalid --set format: '{0}'. Expected KEY=VALUE.")]
    InvalidKeyValue(String),
}

pub fn parse_run_mode(value: &str) -> Result<RunMode, ParseError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "serial" => Ok(RunMode::Serial),
        "parallel" => Ok(RunMode::Parallel),
        _ => Err(ParseError::InvalidRunMode(value.to_string())),
    }
}

pub fn parse_poll_interval(seconds: f64) -> Result<Duration, ParseError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ParseError::InvalidPollInterval(seconds));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| ParseError::InvalidPollInterval(seconds))
}

/// Splits `KEY=VALUE` at the first `=`. The key is trimmed and must be non-empty.
pub fn parse_key_value(pair: &str) -> Result<(&str, &str), ParseError> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(ParseError::InvalidKeyValue(pair.to_string())),
    }
}
