use crate::core::models::status::{JobState, JobStatus};
use crate::core::process::JobHandle;
use std::sync::Arc;

/// One managed job together with the pool-side scheduling bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct JobSlot {
    pub handle: Arc<dyn JobHandle>,
    pub state: JobState,
    pub retries: usize,
}

impl JobSlot {
    pub fn new(handle: Arc<dyn JobHandle>) -> Self {
        Self {
            handle,
            state: JobState::Queued,
            retries: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = JobState::Queued;
        self.retries = 0;
    }

    pub fn is_queued(&self) -> bool {
        self.state == JobState::Queued
    }

    pub fn snapshot(&self, index: usize) -> JobStatus {
        JobStatus {
            index,
            name: self.handle.name().to_string(),
            package: self.handle.package_name().to_string(),
            work_dir: self.handle.work_dir().to_path_buf(),
            state: self.state,
            retries: self.retries,
            is_running: self.handle.is_running(),
            is_error: self.handle.is_error(),
            run_time: self.handle.run_time(),
        }
    }
}

/// What a completed scheduler run achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Jobs that reached [`JobState::Finished`] during the run.
    pub finished: usize,
    /// Jobs the pool held when the run ended.
    pub total: usize,
    /// Whether the run stopped because the kill flag was raised.
    pub killed: bool,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        !self.killed && self.finished == self.total
    }
}
