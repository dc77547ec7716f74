use simrunner::engine::config::{DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL, RunMode};
use simrunner::workflows::runner::DEFAULT_RUNNER_NAME;
use std::time::Duration;

pub struct DefaultsConfig {
    pub name: String,
    pub mode: RunMode,
    /// `None` means one slot per available logical core.
    pub batch_size: Option<usize>,
    pub max_retries: usize,
    pub poll_interval: Duration,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_RUNNER_NAME.to_string(),
            mode: RunMode::Parallel,
            batch_size: None,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
