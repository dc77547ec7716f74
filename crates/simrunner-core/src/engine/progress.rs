use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    RunStart { total: u64 },
    JobStarted { index: usize, attempt: usize },
    JobRetry { index: usize, retries: usize },
    JobFinished { index: usize, success: bool },
    RunFinish { finished: u64, killed: bool },

    Message(String),
}

pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync + 'static>;

/// Forwards scheduler events to an optional callback.
///
/// The reporter is cheap to clone so the background run thread can own a copy.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<Arc<ProgressCallback>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
