use super::error::RunnerError;
use super::state::JobSlot;
use crate::core::models::status::{JobState, JobStatus};
use crate::core::process::JobHandle;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The ordered collection of managed jobs and their scheduling state.
///
/// Indices are positions in insertion order and stay stable until a removal
/// shifts every higher index down by one.
#[derive(Debug, Default)]
pub struct JobPool {
    slots: Vec<JobSlot>,
    work_dir: Option<PathBuf>,
}

impl JobPool {
    pub fn new(work_dir: Option<PathBuf>) -> Self {
        Self {
            slots: Vec::new(),
            work_dir,
        }
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Appends jobs to the pool, all or nothing.
    ///
    /// When a shared root is configured every job is replaced by a copy whose
    /// working directory is `<root>/<basename of its original directory>`.
    pub fn add(&mut self, jobs: Vec<Arc<dyn JobHandle>>) -> Result<(), RunnerError> {
        for job in &jobs {
            if job.work_dir().as_os_str().is_empty() {
                return Err(RunnerError::InvalidHandle {
                    name: job.name().to_string(),
                    reason: "the process has no working directory".to_string(),
                });
            }
            if job.is_running() {
                return Err(RunnerError::InvalidState {
                    name: job.name().to_string(),
                    reason: "cannot add a process that is already running".to_string(),
                });
            }
        }

        let jobs = match &self.work_dir {
            Some(root) => self.nest_directories(root, jobs)?,
            None => jobs,
        };

        for job in jobs {
            debug!(
                "Adding {} process '{}' at index {} (work dir: {:?}).",
                job.package_name(),
                job.name(),
                self.slots.len(),
                job.work_dir()
            );
            self.slots.push(JobSlot::new(job));
        }
        Ok(())
    }

    fn nest_directories(
        &self,
        root: &Path,
        jobs: Vec<Arc<dyn JobHandle>>,
    ) -> Result<Vec<Arc<dyn JobHandle>>, RunnerError> {
        let mut taken: HashSet<PathBuf> = self
            .slots
            .iter()
            .map(|slot| slot.handle.work_dir().to_path_buf())
            .collect();

        let mut nested = Vec::with_capacity(jobs.len());
        for job in jobs {
            let basename = job.work_dir().file_name().ok_or_else(|| {
                RunnerError::InvalidHandle {
                    name: job.name().to_string(),
                    reason: format!(
                        "working directory {:?} has no final component to nest",
                        job.work_dir()
                    ),
                }
            })?;
            let new_dir = root.join(basename);
            if !taken.insert(new_dir.clone()) {
                return Err(RunnerError::InvalidValue {
                    parameter: "work_dir",
                    reason: format!(
                        "process '{}' would share the nested directory {:?} with another process",
                        job.name(),
                        new_dir
                    ),
                });
            }
            let moved =
                job.clone_with_work_dir(&new_dir)
                    .map_err(|e| RunnerError::InvalidHandle {
                        name: job.name().to_string(),
                        reason: e.to_string(),
                    })?;
            nested.push(moved);
        }
        Ok(nested)
    }

    /// Resolves a possibly negative index against the current length.
    pub fn resolve_index(&self, index: isize) -> Result<usize, RunnerError> {
        let len = self.slots.len();
        let resolved = if index < 0 {
            index.checked_add(len as isize)
        } else {
            Some(index)
        };
        match resolved {
            Some(i) if i >= 0 && (i as usize) < len => Ok(i as usize),
            _ => Err(RunnerError::IndexOutOfRange { index, len }),
        }
    }

    /// Kills and removes the job at `index`. Kill failures are logged and
    /// otherwise ignored.
    pub fn remove(&mut self, index: isize) -> Result<Arc<dyn JobHandle>, RunnerError> {
        let idx = self.resolve_index(index)?;
        let slot = self.slots.remove(idx);
        if let Err(e) = slot.handle.kill() {
            warn!("Ignoring failure while killing removed process: {}", e);
        }
        debug!("Removed process '{}' from index {}.", slot.handle.name(), idx);
        Ok(slot.handle)
    }

    pub fn handle(&self, index: isize) -> Result<Arc<dyn JobHandle>, RunnerError> {
        let idx = self.resolve_index(index)?;
        Ok(self.slots[idx].handle.clone())
    }

    pub fn handles(&self) -> Vec<Arc<dyn JobHandle>> {
        self.slots.iter().map(|slot| slot.handle.clone()).collect()
    }

    pub fn state(&self, index: usize) -> Option<JobState> {
        self.slots.get(index).map(|slot| slot.state)
    }

    pub fn retries(&self, index: usize) -> Option<usize> {
        self.slots.get(index).map(|slot| slot.retries)
    }

    pub fn running(&self) -> Vec<usize> {
        self.indices_where(|slot| slot.handle.is_running())
    }

    pub fn queued(&self) -> Vec<usize> {
        self.indices_where(JobSlot::is_queued)
    }

    pub fn errored(&self) -> Vec<usize> {
        self.indices_where(|slot| slot.handle.is_error())
    }

    pub fn in_state(&self, state: JobState) -> Vec<usize> {
        self.indices_where(|slot| slot.state == state)
    }

    pub fn is_running(&self) -> Vec<bool> {
        self.slots.iter().map(|s| s.handle.is_running()).collect()
    }

    pub fn is_queued(&self) -> Vec<bool> {
        self.slots.iter().map(JobSlot::is_queued).collect()
    }

    pub fn is_error(&self) -> Vec<bool> {
        self.slots.iter().map(|s| s.handle.is_error()).collect()
    }

    pub fn run_times(&self) -> Vec<Duration> {
        self.slots.iter().map(|s| s.handle.run_time()).collect()
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| slot.snapshot(i))
            .collect()
    }

    fn indices_where(&self, pred: impl Fn(&JobSlot) -> bool) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| pred(slot))
            .map(|(i, _)| i)
            .collect()
    }

    // --- Scheduler-side mutation ---

    pub(crate) fn reset_all(&mut self) {
        self.slots.iter_mut().for_each(JobSlot::reset);
    }

    pub(crate) fn next_queued(&self) -> Option<usize> {
        self.slots.iter().position(JobSlot::is_queued)
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut JobSlot> {
        self.slots.get_mut(index)
    }
}
