use super::error::RunnerError;
use std::num::NonZeroUsize;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: usize = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// One job at a time, in pool order, each retried to completion before the
    /// next begins.
    Serial,
    /// Up to `concurrency` jobs at once, with failed jobs re-queued.
    #[default]
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub mode: RunMode,
    /// Maximum number of jobs allowed to be running simultaneously. Ignored in
    /// serial mode.
    pub concurrency: usize,
    /// Maximum number of failed attempts tolerated per job.
    pub max_retries: usize,
    /// How long the parallel driver sleeps between status sweeps.
    pub poll_interval: Duration,
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.concurrency == 0 {
            return Err(RunnerError::InvalidValue {
                parameter: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(RunnerError::InvalidValue {
                parameter: "max_retries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(RunnerError::InvalidValue {
                parameter: "poll_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            concurrency: default_concurrency(),
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// The host's available parallelism, falling back to a single slot when it
/// cannot be determined.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[derive(Default)]
pub struct SchedulerConfigBuilder {
    mode: Option<RunMode>,
    concurrency: Option<usize>,
    max_retries: Option<usize>,
    poll_interval: Option<Duration>,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn serial(self, serial: bool) -> Self {
        self.mode(if serial {
            RunMode::Serial
        } else {
            RunMode::Parallel
        })
    }
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<SchedulerConfig, RunnerError> {
        let config = SchedulerConfig {
            mode: self.mode.unwrap_or_default(),
            concurrency: self.concurrency.unwrap_or_else(default_concurrency),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
        };
        config.validate()?;
        Ok(config)
    }
}
