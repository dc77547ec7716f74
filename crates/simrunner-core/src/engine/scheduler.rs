use super::config::{RunMode, SchedulerConfig};
use super::pool::JobPool;
use super::progress::{Progress, ProgressReporter};
use super::state::RunSummary;
use crate::core::models::status::JobState;
use crate::core::process::JobHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const KILL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) type SharedPool = Arc<RwLock<JobPool>>;

pub(crate) fn read_pool(pool: &RwLock<JobPool>) -> RwLockReadGuard<'_, JobPool> {
    pool.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write_pool(pool: &RwLock<JobPool>) -> RwLockWriteGuard<'_, JobPool> {
    pool.write().unwrap_or_else(|e| e.into_inner())
}

/// Clears the runner's "active" flag when the run thread exits, even by panic.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    index: usize,
    start_failed: bool,
}

/// Drives every job in a pool to a terminal state on a background thread.
///
/// While a run is alive it is the only writer of per-job scheduling state. It
/// never holds the pool lock while blocking on a job.
pub(crate) struct Scheduler {
    pool: SharedPool,
    kill_flag: Arc<AtomicBool>,
    config: SchedulerConfig,
    reporter: ProgressReporter,
}

impl Scheduler {
    pub fn new(
        pool: SharedPool,
        kill_flag: Arc<AtomicBool>,
        config: SchedulerConfig,
        reporter: ProgressReporter,
    ) -> Self {
        Self {
            pool,
            kill_flag,
            config,
            reporter,
        }
    }

    /// Starts the run on a named thread. `active` must already be raised by
    /// the caller; it is lowered when the thread exits.
    pub fn spawn(
        self,
        thread_name: String,
        active: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<RunSummary>> {
        thread::Builder::new().name(thread_name).spawn(move || {
            let _guard = ActiveGuard(active);
            self.run()
        })
    }

    pub fn run(&self) -> RunSummary {
        write_pool(&self.pool).reset_all();
        let total = read_pool(&self.pool).len();
        self.reporter.report(Progress::RunStart {
            total: total as u64,
        });

        let summary = match self.config.mode {
            RunMode::Serial => self.run_serial(),
            RunMode::Parallel => self.run_parallel(),
        };

        info!(
            "Scheduler run ended: {}/{} process(es) finished{}.",
            summary.finished,
            summary.total,
            if summary.killed { " (killed)" } else { "" }
        );
        self.reporter.report(Progress::RunFinish {
            finished: summary.finished as u64,
            killed: summary.killed,
        });
        summary
    }

    fn is_killed(&self) -> bool {
        self.kill_flag.load(Ordering::SeqCst)
    }

    fn handle_at(&self, index: usize) -> Option<Arc<dyn JobHandle>> {
        read_pool(&self.pool).handle(index as isize).ok()
    }

    fn set_state(&self, index: usize, state: JobState) {
        if let Some(slot) = write_pool(&self.pool).slot_mut(index) {
            slot.state = state;
        }
    }

    fn start_job(&self, index: usize, handle: &dyn JobHandle) -> bool {
        let attempt = {
            let mut pool = write_pool(&self.pool);
            match pool.slot_mut(index) {
                Some(slot) => {
                    slot.state = JobState::Running;
                    slot.retries + 1
                }
                None => return false,
            }
        };

        debug!(
            "Starting process {} ('{}'), attempt {}.",
            index,
            handle.name(),
            attempt
        );
        self.reporter.report(Progress::JobStarted { index, attempt });

        match handle.start() {
            Ok(()) => true,
            Err(e) => {
                warn!("Process {} ('{}') failed to start: {}", index, handle.name(), e);
                false
            }
        }
    }

    fn finish_job(&self, index: usize, success: bool) {
        self.set_state(index, JobState::Finished);
        debug!("Process {} finished (success: {}).", index, success);
        self.reporter.report(Progress::JobFinished { index, success });
    }

    #[instrument(skip_all, name = "serial_run")]
    fn run_serial(&self) -> RunSummary {
        let total = read_pool(&self.pool).len();
        info!("Running {} process(es) in serial.", total);

        let mut finished = 0;
        for index in 0..total {
            if self.is_killed() {
                break;
            }
            let Some(handle) = self.handle_at(index) else {
                break;
            };

            // `None` once the kill flag interrupts the job before it settles.
            let mut outcome = None;
            while !self.is_killed() {
                let started = self.start_job(index, handle.as_ref());
                if started {
                    handle.wait();
                }
                if self.is_killed() {
                    break;
                }

                if started && !handle.is_error() {
                    outcome = Some(true);
                    break;
                }

                let retries = {
                    let mut pool = write_pool(&self.pool);
                    let Some(slot) = pool.slot_mut(index) else {
                        break;
                    };
                    slot.state = JobState::Errored;
                    slot.retries += 1;
                    slot.retries
                };
                if retries >= self.config.max_retries {
                    warn!(
                        "Process {} ('{}') failed {} time(s); giving up.",
                        index,
                        handle.name(),
                        retries
                    );
                    outcome = Some(false);
                    break;
                }
                self.reporter.report(Progress::JobRetry { index, retries });
            }

            let Some(success) = outcome else {
                debug!("Serial run stopped at process {}.", index);
                break;
            };
            self.finish_job(index, success);
            finished += 1;
        }

        RunSummary {
            finished,
            total: read_pool(&self.pool).len(),
            killed: self.is_killed(),
        }
    }

    #[instrument(skip_all, name = "parallel_run")]
    fn run_parallel(&self) -> RunSummary {
        let concurrency = self.config.concurrency;
        info!(
            "Running {} process(es) in parallel with a batch size of {}.",
            read_pool(&self.pool).len(),
            concurrency
        );

        let mut finished = 0;
        let mut in_flight: Vec<InFlight> = Vec::with_capacity(concurrency);

        loop {
            // Jobs may be appended while the run is alive.
            let total = read_pool(&self.pool).len();
            if finished >= total || self.is_killed() {
                break;
            }

            while in_flight.len() < concurrency {
                let next = {
                    let pool = read_pool(&self.pool);
                    pool.next_queued()
                        .and_then(|i| pool.handle(i as isize).ok().map(|h| (i, h)))
                };
                let Some((index, handle)) = next else {
                    break;
                };
                let started = self.start_job(index, handle.as_ref());
                in_flight.push(InFlight {
                    index,
                    start_failed: !started,
                });
            }

            let mut still_running = Vec::with_capacity(in_flight.len());
            for job in in_flight.drain(..) {
                let Some(handle) = self.handle_at(job.index) else {
                    continue;
                };
                if !job.start_failed && handle.is_running() {
                    still_running.push(job);
                    continue;
                }

                let errored = job.start_failed || handle.is_error();
                let retried = {
                    let mut pool = write_pool(&self.pool);
                    let Some(slot) = pool.slot_mut(job.index) else {
                        continue;
                    };
                    if errored && slot.retries < self.config.max_retries {
                        slot.retries += 1;
                        slot.state = JobState::Queued;
                        Some(slot.retries)
                    } else {
                        None
                    }
                };

                match retried {
                    Some(retries) => {
                        debug!(
                            "Process {} ('{}') failed; re-queued (retry {}/{}).",
                            job.index,
                            handle.name(),
                            retries,
                            self.config.max_retries
                        );
                        self.reporter.report(Progress::JobRetry {
                            index: job.index,
                            retries,
                        });
                    }
                    None => {
                        if errored {
                            warn!(
                                "Process {} ('{}') exhausted its {} retries.",
                                job.index,
                                handle.name(),
                                self.config.max_retries
                            );
                        }
                        self.finish_job(job.index, !errored);
                        finished += 1;
                    }
                }
            }
            in_flight = still_running;

            if finished >= read_pool(&self.pool).len() {
                break;
            }
            self.sleep_unless_killed(self.config.poll_interval);
        }

        RunSummary {
            finished,
            total: read_pool(&self.pool).len(),
            killed: self.is_killed(),
        }
    }

    fn sleep_unless_killed(&self, interval: Duration) {
        let deadline = Instant::now() + interval;
        while !self.is_killed() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(KILL_CHECK_INTERVAL));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{MockJob, Recorder};
    use std::sync::Mutex;

    fn shared(jobs: Vec<MockJob>) -> SharedPool {
        let mut pool = JobPool::new(None);
        pool.add(jobs.into_iter().map(MockJob::into_handle).collect())
            .unwrap();
        Arc::new(RwLock::new(pool))
    }

    fn config(mode: RunMode, concurrency: usize, max_retries: usize) -> SchedulerConfig {
        SchedulerConfig {
            mode,
            concurrency,
            max_retries,
            poll_interval: Duration::from_millis(2),
        }
    }

    fn scheduler(pool: &SharedPool, config: SchedulerConfig) -> Scheduler {
        Scheduler::new(
            pool.clone(),
            Arc::new(AtomicBool::new(false)),
            config,
            ProgressReporter::new(),
        )
    }

    #[test]
    fn parallel_run_finishes_every_job() {
        let pool = shared((0..6).map(|i| MockJob::new(&format!("j{i}"))).collect());

        let summary = scheduler(&pool, config(RunMode::Parallel, 2, 3)).run();

        assert_eq!(summary.finished, 6);
        assert!(summary.is_complete());
        let pool = read_pool(&pool);
        assert_eq!(pool.in_state(JobState::Finished).len(), 6);
        assert!((0..6).all(|i| pool.retries(i) == Some(0)));
    }

    #[test]
    fn parallel_always_failing_job_stops_at_retry_budget() {
        let bad = MockJob::failing("bad");
        let pool = shared(vec![bad.clone(), MockJob::succeeding("good")]);

        let summary = scheduler(&pool, config(RunMode::Parallel, 2, 3)).run();

        assert_eq!(summary.finished, 2);
        let pool = read_pool(&pool);
        assert_eq!(pool.retries(0), Some(3));
        assert_eq!(pool.retries(1), Some(0));
        assert_eq!(pool.state(0), Some(JobState::Finished));
        assert_eq!(bad.attempts(), 4);
        assert!(pool.is_error()[0]);
    }

    #[test]
    fn parallel_job_recovering_on_retry_counts_one_failure() {
        let flaky = MockJob::new("flaky").with_outcomes(&[false, true]);
        let pool = shared(vec![flaky.clone()]);

        scheduler(&pool, config(RunMode::Parallel, 1, 5)).run();

        let pool = read_pool(&pool);
        assert_eq!(pool.retries(0), Some(1));
        assert_eq!(flaky.attempts(), 2);
        assert!(!pool.is_error()[0]);
    }

    #[test]
    fn parallel_run_never_exceeds_concurrency_budget() {
        let recorder = Recorder::new();
        let jobs = (0..8)
            .map(|i| {
                let outcomes: &[bool] = if i % 3 == 0 { &[false, true] } else { &[true] };
                MockJob::new(&format!("j{i}"))
                    .with_duration(Duration::from_millis(15))
                    .with_outcomes(outcomes)
                    .with_recorder(&recorder)
            })
            .collect();
        let pool = shared(jobs);

        scheduler(&pool, config(RunMode::Parallel, 3, 2)).run();

        assert!(recorder.peak() <= 3);
        assert!(recorder.peak() >= 2);
    }

    #[test]
    fn parallel_run_starts_lower_indices_first() {
        let recorder = Recorder::new();
        let jobs = ["a", "b", "c", "d"]
            .iter()
            .map(|n| MockJob::new(n).with_recorder(&recorder))
            .collect();
        let pool = shared(jobs);

        scheduler(&pool, config(RunMode::Parallel, 1, 1)).run();

        assert_eq!(recorder.starts(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn retried_job_is_not_reordered_ahead_of_lower_queued_jobs() {
        let recorder = Recorder::new();
        let pool = shared(vec![
            MockJob::new("a")
                .with_outcomes(&[false, true])
                .with_recorder(&recorder),
            MockJob::new("b").with_recorder(&recorder),
        ]);

        scheduler(&pool, config(RunMode::Parallel, 1, 2)).run();

        assert_eq!(recorder.starts(), vec!["a", "a", "b"]);
    }

    #[test]
    fn serial_run_executes_jobs_one_at_a_time_in_order() {
        let recorder = Recorder::new();
        let jobs = ["a", "b", "c"]
            .iter()
            .map(|n| MockJob::new(n).with_recorder(&recorder))
            .collect();
        let pool = shared(jobs);

        let summary = scheduler(&pool, config(RunMode::Serial, 4, 2)).run();

        assert_eq!(summary.finished, 3);
        assert_eq!(recorder.starts(), vec!["a", "b", "c"]);
        assert_eq!(recorder.peak(), 1);
    }

    #[test]
    fn serial_failing_job_is_retried_until_budget_then_next_job_runs() {
        let recorder = Recorder::new();
        let bad = MockJob::failing("bad").with_recorder(&recorder);
        let pool = shared(vec![bad.clone(), MockJob::new("good").with_recorder(&recorder)]);

        let summary = scheduler(&pool, config(RunMode::Serial, 1, 3)).run();

        assert_eq!(summary.finished, 2);
        assert_eq!(bad.attempts(), 3);
        assert_eq!(recorder.starts(), vec!["bad", "bad", "bad", "good"]);
        let pool = read_pool(&pool);
        assert_eq!(pool.retries(0), Some(3));
        assert_eq!(pool.state(0), Some(JobState::Finished));
        assert_eq!(pool.state(1), Some(JobState::Finished));
    }

    #[test]
    fn kill_flag_stops_parallel_run_without_starting_new_jobs() {
        let recorder = Recorder::new();
        let jobs = (0..4)
            .map(|i| {
                MockJob::new(&format!("j{i}"))
                    .with_duration(Duration::from_secs(5))
                    .with_recorder(&recorder)
            })
            .collect();
        let pool = shared(jobs);
        let kill_flag = Arc::new(AtomicBool::new(false));
        let sched = Scheduler::new(
            pool.clone(),
            kill_flag.clone(),
            SchedulerConfig {
                poll_interval: Duration::from_secs(5),
                ..config(RunMode::Parallel, 2, 1)
            },
            ProgressReporter::new(),
        );

        let handle = thread::spawn(move || sched.run());
        thread::sleep(Duration::from_millis(30));
        kill_flag.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let summary = handle.join().unwrap();

        assert!(summary.killed);
        assert_eq!(summary.finished, 0);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(recorder.starts().len(), 2);
        for h in read_pool(&pool).handles() {
            h.kill().unwrap();
        }
    }

    #[test]
    fn start_failures_count_as_failed_attempts() {
        #[derive(Debug)]
        struct Unlaunchable(MockJob);

        impl JobHandle for Unlaunchable {
            fn name(&self) -> &str {
                self.0.name()
            }
            fn package_name(&self) -> &str {
                self.0.package_name()
            }
            fn work_dir(&self) -> &std::path::Path {
                self.0.work_dir()
            }
            fn start(&self) -> Result<(), crate::core::process::ProcessError> {
                Err(crate::core::process::ProcessError::Relocation {
                    name: "x".into(),
                    reason: "cannot launch".into(),
                })
            }
            fn wait(&self) {}
            fn kill(&self) -> Result<(), crate::core::process::ProcessError> {
                Ok(())
            }
            fn is_running(&self) -> bool {
                false
            }
            fn is_error(&self) -> bool {
                false
            }
            fn run_time(&self) -> Duration {
                Duration::ZERO
            }
            fn clone_with_work_dir(
                &self,
                work_dir: &std::path::Path,
            ) -> Result<Arc<dyn JobHandle>, crate::core::process::ProcessError> {
                self.0.clone_with_work_dir(work_dir)
            }
        }

        for mode in [RunMode::Serial, RunMode::Parallel] {
            let mut pool = JobPool::new(None);
            pool.add(vec![Arc::new(Unlaunchable(MockJob::new("u")))])
                .unwrap();
            let pool = Arc::new(RwLock::new(pool));

            let summary = scheduler(&pool, config(mode, 1, 2)).run();

            assert_eq!(summary.finished, 1);
            assert_eq!(read_pool(&pool).retries(0), Some(2));
        }
    }

    #[test]
    fn progress_events_describe_the_run() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let reporter = ProgressReporter::with_callback(Box::new(move |p| {
            sink.lock().unwrap().push(p);
        }));
        let pool = shared(vec![MockJob::new("a").with_outcomes(&[false, true])]);
        let sched = Scheduler::new(
            pool,
            Arc::new(AtomicBool::new(false)),
            config(RunMode::Parallel, 1, 3),
            reporter,
        );

        sched.run();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                Progress::RunStart { total: 1 },
                Progress::JobStarted { index: 0, attempt: 1 },
                Progress::JobRetry { index: 0, retries: 1 },
                Progress::JobStarted { index: 0, attempt: 2 },
                Progress::JobFinished {
                    index: 0,
                    success: true
                },
                Progress::RunFinish {
                    finished: 1,
                    killed: false
                },
            ]
        );
    }
}
