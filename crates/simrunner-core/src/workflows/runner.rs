use crate::core::models::status::JobStatus;
use crate::core::process::JobHandle;
use crate::engine::config::SchedulerConfig;
use crate::engine::error::RunnerError;
use crate::engine::pool::JobPool;
use crate::engine::progress::ProgressReporter;
use crate::engine::scheduler::{Scheduler, SharedPool, read_pool, write_pool};
use crate::engine::state::RunSummary;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_RUNNER_NAME: &str = "runner";

/// The result of asking a runner to start all of its processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A previous run is still alive; nothing was started.
    AlreadyRunning,
}

/// Manages and runs multiple simulation processes, e.g. a free-energy
/// calculation at several lambda values.
///
/// The runner owns a [`JobPool`] and at most one background scheduler run at a
/// time. Every query is safe to call while a run is in progress and reflects
/// its live progress.
///
/// # Examples
///
/// ```no_run
/// use simrunner::core::process::JobHandle;
/// use simrunner::core::process::engine::{Engine, EngineCommand, EngineProcess};
/// use simrunner::engine::config::SchedulerConfigBuilder;
/// use simrunner::workflows::runner::ProcessRunner;
/// use std::sync::Arc;
///
/// let lambdas: Vec<Arc<dyn JobHandle>> = ["0.00", "0.50", "1.00"]
///     .iter()
///     .map(|l| {
///         let dir = format!("/tmp/lambda_{l}");
///         let command = EngineCommand::new(format!("lambda_{l}"), Engine::Somd, "somd-freenrg", dir)
///             .with_args(["-C", "somd.cfg"]);
///         Arc::new(EngineProcess::new(command)) as Arc<dyn JobHandle>
///     })
///     .collect();
/// let runner = ProcessRunner::new(lambdas, "fep", Some("/work/fep".into()))?;
/// runner.start_all(SchedulerConfigBuilder::new().concurrency(2).build()?)?;
/// runner.wait();
/// println!("{} process(es) failed", runner.n_error());
/// # Ok::<(), simrunner::engine::error::RunnerError>(())
/// ```
pub struct ProcessRunner {
    name: String,
    pool: SharedPool,
    kill_flag: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<RunSummary>>>,
    reporter: ProgressReporter,
}

impl ProcessRunner {
    /// Creates a runner over `processes`.
    ///
    /// With a `work_dir`, each process is relocated to
    /// `<work_dir>/<basename of its own working directory>`.
    ///
    /// # Errors
    ///
    /// Fails if any process is unusable, already running, or would collide
    /// with another process's nested directory.
    pub fn new(
        processes: Vec<Arc<dyn JobHandle>>,
        name: impl Into<String>,
        work_dir: Option<PathBuf>,
    ) -> Result<Self, RunnerError> {
        let mut pool = JobPool::new(work_dir);
        pool.add(processes)?;

        Ok(Self {
            name: name.into(),
            pool: Arc::new(RwLock::new(pool)),
            kill_flag: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
            reporter: ProgressReporter::new(),
        })
    }

    /// Routes scheduler progress events to `reporter` for subsequent runs.
    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn work_dir(&self) -> Option<PathBuf> {
        read_pool(&self.pool).work_dir().map(Path::to_path_buf)
    }

    pub fn processes(&self) -> Vec<Arc<dyn JobHandle>> {
        read_pool(&self.pool).handles()
    }

    pub fn add_process(&self, process: Arc<dyn JobHandle>) -> Result<(), RunnerError> {
        self.add_processes(vec![process])
    }

    pub fn add_processes(&self, processes: Vec<Arc<dyn JobHandle>>) -> Result<(), RunnerError> {
        write_pool(&self.pool).add(processes)
    }

    /// Kills and removes the process at `index` (negative indices count from
    /// the end), returning it.
    ///
    /// Returns `Ok(None)` without touching the pool while a run is active; kill
    /// all processes first.
    pub fn remove_process(&self, index: isize) -> Result<Option<Arc<dyn JobHandle>>, RunnerError> {
        if self.is_active() {
            warn!(
                "ProcessRunner '{}' has started. Kill all processes before removing.",
                self.name
            );
            return Ok(None);
        }
        write_pool(&self.pool).remove(index).map(Some)
    }

    pub fn n_processes(&self) -> usize {
        read_pool(&self.pool).len()
    }

    pub fn n_running(&self) -> usize {
        self.running().len()
    }

    pub fn n_queued(&self) -> usize {
        self.queued().len()
    }

    pub fn n_error(&self) -> usize {
        self.errored().len()
    }

    pub fn running(&self) -> Vec<usize> {
        read_pool(&self.pool).running()
    }

    pub fn queued(&self) -> Vec<usize> {
        read_pool(&self.pool).queued()
    }

    pub fn errored(&self) -> Vec<usize> {
        read_pool(&self.pool).errored()
    }

    pub fn is_running(&self) -> Vec<bool> {
        read_pool(&self.pool).is_running()
    }

    pub fn is_queued(&self) -> Vec<bool> {
        read_pool(&self.pool).is_queued()
    }

    pub fn is_error(&self) -> Vec<bool> {
        read_pool(&self.pool).is_error()
    }

    pub fn run_times(&self) -> Vec<Duration> {
        read_pool(&self.pool).run_times()
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        read_pool(&self.pool).statuses()
    }

    /// Whether a background scheduler run is alive.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Starts the single process at `index`, outside any scheduler run.
    pub fn start(&self, index: isize) -> Result<(), RunnerError> {
        let handle = read_pool(&self.pool).handle(index)?;
        handle.start()?;
        Ok(())
    }

    /// Kills the single process at `index`. Kill failures are logged only.
    pub fn kill(&self, index: isize) -> Result<(), RunnerError> {
        let handle = read_pool(&self.pool).handle(index)?;
        if let Err(e) = handle.kill() {
            warn!("Failed to kill process {}: {}", index, e);
        }
        Ok(())
    }

    /// Launches a background run that drives every process to completion.
    ///
    /// Returns immediately. Calling this while a run is alive is not an error:
    /// it logs and returns [`StartOutcome::AlreadyRunning`].
    pub fn start_all(&self, config: SchedulerConfig) -> Result<StartOutcome, RunnerError> {
        if read_pool(&self.pool).is_empty() {
            return Err(RunnerError::Empty);
        }
        config.validate()?;

        let mut thread = self.thread.lock().unwrap_or_else(|e| e.into_inner());
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("ProcessRunner '{}' already started!", self.name);
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.kill_flag.store(false, Ordering::SeqCst);
        info!(
            "ProcessRunner '{}' starting {} process(es) ({:?}, batch size {}, max retries {}).",
            self.name,
            self.n_processes(),
            config.mode,
            config.concurrency,
            config.max_retries
        );

        let scheduler = Scheduler::new(
            self.pool.clone(),
            self.kill_flag.clone(),
            config,
            self.reporter.clone(),
        );
        match scheduler.spawn(format!("simrunner-{}", self.name), self.active.clone()) {
            Ok(handle) => {
                *thread = Some(handle);
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(RunnerError::InvalidState {
                    name: self.name.clone(),
                    reason: format!("failed to spawn the scheduler thread: {}", e),
                })
            }
        }
    }

    /// Blocks until the background run ends, returning its summary.
    ///
    /// Without a run to join, waits on each process in turn and returns `None`.
    pub fn wait(&self) -> Option<RunSummary> {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match handle {
            Some(handle) => match handle.join() {
                Ok(summary) => Some(summary),
                Err(_) => {
                    warn!("The scheduler thread of '{}' panicked.", self.name);
                    None
                }
            },
            None => {
                for process in self.processes() {
                    process.wait();
                }
                None
            }
        }
    }

    /// Stops the scheduler from starting anything new and kills every process.
    pub fn kill_all(&self) {
        self.kill_flag.store(true, Ordering::SeqCst);
        for (index, process) in self.processes().iter().enumerate() {
            if let Err(e) = process.kill() {
                warn!("Failed to kill process {}: {}", index, e);
            }
        }
    }

    /// Restarts every process currently in an error state.
    ///
    /// This bypasses the scheduler's retry bookkeeping entirely.
    pub fn restart_failed(&self) {
        for (index, process) in self.processes().iter().enumerate() {
            if process.is_error() {
                info!("Restarting failed process {} ('{}').", index, process.name());
                if let Err(e) = process.start() {
                    warn!("Failed to restart process {}: {}", index, e);
                }
            }
        }
    }
}

impl fmt::Display for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let work_dir = self
            .work_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "None".to_string());
        write!(
            f,
            "<ProcessRunner: nProcesses={}, nRunning={}, nQueued={}, nError={}, name='{}', work_dir='{}'>",
            self.n_processes(),
            self.n_running(),
            self.n_queued(),
            self.n_error(),
            self.name,
            work_dir
        )
    }
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        // A detached run would otherwise keep polling an unreachable pool.
        self.kill_flag.store(true, Ordering::SeqCst);
    }
}
