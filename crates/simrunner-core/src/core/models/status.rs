use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Pool-side lifecycle tag of a job, independent of the handle's live flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    #[default]
    Queued,
    Running,
    /// The last attempt failed and the scheduler has not yet decided whether
    /// to retry it.
    Errored,
    /// No further scheduling action will be taken. This says nothing about
    /// success; check the error flag.
    Finished,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Errored => "errored",
            JobState::Finished => "finished",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A point-in-time snapshot of one managed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub index: usize,
    pub name: String,
    pub package: String,
    pub work_dir: PathBuf,
    pub state: JobState,
    pub retries: usize,
    pub is_running: bool,
    pub is_error: bool,
    pub run_time: Duration,
}

impl JobStatus {
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Finished && !self.is_error
    }
}
