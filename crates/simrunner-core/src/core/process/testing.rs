use super::{JobHandle, ProcessError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Shared record of which jobs were started, in order, and how many ran at once.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    starts: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Recorder {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn starts(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn on_start(&self, name: &str) {
        self.starts.lock().unwrap().push(name.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn on_stop(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct MockState {
    attempts: usize,
    started_at: Option<Instant>,
    running: bool,
    error: bool,
    accumulated: Duration,
}

/// A scripted [`JobHandle`] whose attempts succeed or fail according to a plan.
///
/// The last planned outcome repeats for every further attempt.
#[derive(Debug, Clone)]
pub(crate) struct MockJob {
    name: String,
    work_dir: PathBuf,
    outcomes: Vec<bool>,
    duration: Duration,
    fail_kill: bool,
    recorder: Option<Arc<Recorder>>,
    state: Arc<Mutex<MockState>>,
}

impl MockJob {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            work_dir: PathBuf::from("/tmp").join(name),
            outcomes: vec![true],
            duration: Duration::from_millis(10),
            fail_kill: false,
            recorder: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub(crate) fn succeeding(name: &str) -> Self {
        Self::new(name)
    }

    pub(crate) fn failing(name: &str) -> Self {
        Self::new(name).with_outcomes(&[false])
    }

    pub(crate) fn with_outcomes(mut self, outcomes: &[bool]) -> Self {
        self.outcomes = outcomes.to_vec();
        self
    }

    pub(crate) fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub(crate) fn with_work_dir(mut self, dir: &str) -> Self {
        self.work_dir = PathBuf::from(dir);
        self
    }

    pub(crate) fn with_failing_kill(mut self) -> Self {
        self.fail_kill = true;
        self
    }

    pub(crate) fn with_recorder(mut self, recorder: &Arc<Recorder>) -> Self {
        self.recorder = Some(recorder.clone());
        self
    }

    pub(crate) fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub(crate) fn into_handle(self) -> Arc<dyn JobHandle> {
        Arc::new(self)
    }

    fn outcome_for(&self, attempt: usize) -> bool {
        let idx = attempt.saturating_sub(1).min(self.outcomes.len() - 1);
        self.outcomes[idx]
    }

    fn refreshed(&self) -> MutexGuard<'_, MockState> {
        let mut state = self.state.lock().unwrap();
        if state.running
            && state
                .started_at
                .is_some_and(|t| t.elapsed() >= self.duration)
        {
            self.stop(&mut state);
            state.error = !self.outcome_for(state.attempts);
        }
        state
    }

    fn stop(&self, state: &mut MockState) {
        state.running = false;
        if let Some(t) = state.started_at.take() {
            state.accumulated += t.elapsed();
        }
        if let Some(recorder) = &self.recorder {
            recorder.on_stop();
        }
    }
}

impl JobHandle for MockJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn package_name(&self) -> &str {
        "MOCK"
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn start(&self) -> Result<(), ProcessError> {
        let mut state = self.refreshed();
        if state.running {
            return Err(ProcessError::AlreadyRunning {
                name: self.name.clone(),
            });
        }
        state.attempts += 1;
        state.running = true;
        state.error = false;
        state.started_at = Some(Instant::now());
        if let Some(recorder) = &self.recorder {
            recorder.on_start(&self.name);
        }
        Ok(())
    }

    fn wait(&self) {
        while self.refreshed().running {
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn kill(&self) -> Result<(), ProcessError> {
        if self.fail_kill {
            return Err(ProcessError::Kill {
                name: self.name.clone(),
                source: std::io::Error::other("signal refused"),
            });
        }
        let mut state = self.refreshed();
        if state.running {
            self.stop(&mut state);
            state.error = false;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.refreshed().running
    }

    fn is_error(&self) -> bool {
        self.refreshed().error
    }

    fn run_time(&self) -> Duration {
        let state = self.state.lock().unwrap();
        state.accumulated + state.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn clone_with_work_dir(&self, work_dir: &Path) -> Result<Arc<dyn JobHandle>, ProcessError> {
        let mut moved = self.clone();
        moved.work_dir = work_dir.to_path_buf();
        moved.state = Arc::new(Mutex::new(MockState::default()));
        Ok(Arc::new(moved))
    }
}
