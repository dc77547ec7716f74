use super::{JobHandle, ProcessError};
use phf::{Map, phf_map};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The molecular-dynamics engines a job can be executed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Amber,
    Gromacs,
    OpenMm,
    Somd,
    /// Any other executable; the runner treats it as an opaque command.
    Generic,
}

static ENGINE_ALIASES: Map<&'static str, Engine> = phf_map! {
    "amber" => Engine::Amber,
    "pmemd" => Engine::Amber,
    "sander" => Engine::Amber,
    "gromacs" => Engine::Gromacs,
    "gmx" => Engine::Gromacs,
    "openmm" => Engine::OpenMm,
    "somd" => Engine::Somd,
    "generic" => Engine::Generic,
    "custom" => Engine::Generic,
};

impl Engine {
    pub fn package_name(&self) -> &'static str {
        match self {
            Engine::Amber => "AMBER",
            Engine::Gromacs => "GROMACS",
            Engine::OpenMm => "OPENMM",
            Engine::Somd => "SOMD",
            Engine::Generic => "GENERIC",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.package_name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown simulation engine '{0}'. Expected one of: amber, gromacs, openmm, somd, generic.")]
pub struct ParseEngineError(String);

impl FromStr for Engine {
    type Err = ParseEngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ENGINE_ALIASES
            .get(s.trim().to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| ParseEngineError(s.to_string()))
    }
}

/// Everything needed to launch one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub name: String,
    pub engine: Engine,
    pub exe: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl EngineCommand {
    pub fn new(
        name: impl Into<String>,
        engine: Engine,
        exe: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            engine,
            exe: exe.into(),
            args: Vec::new(),
            work_dir: work_dir.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.out", self.name))
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.err", self.name))
    }
}

#[derive(Debug, Default)]
struct RunState {
    child: Option<Child>,
    started_at: Option<Instant>,
    accumulated: Duration,
    is_error: bool,
    killed: bool,
}

impl RunState {
    fn refresh(&mut self, name: &str) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => self.finish(name, Some(status)),
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to poll process '{}': {}", name, e);
                self.finish(name, None);
            }
        }
    }

    fn finish(&mut self, name: &str, status: Option<ExitStatus>) {
        self.child = None;
        if let Some(started_at) = self.started_at.take() {
            self.accumulated += started_at.elapsed();
        }
        self.is_error = !self.killed && !status.is_some_and(|s| s.success());
        debug!(
            "Process '{}' exited (status: {:?}, error: {}).",
            name, status, self.is_error
        );
    }

    fn run_time(&self) -> Duration {
        match self.started_at {
            Some(started_at) => self.accumulated + started_at.elapsed(),
            None => self.accumulated,
        }
    }
}

/// A [`JobHandle`] that runs an engine executable as a child process.
///
/// Standard output and error are redirected to `<name>.out` and `<name>.err`
/// inside the working directory, which is created on start if missing.
#[derive(Debug)]
pub struct EngineProcess {
    command: EngineCommand,
    state: Mutex<RunState>,
}

impl EngineProcess {
    pub fn new(command: EngineCommand) -> Self {
        Self {
            command,
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn command(&self) -> &EngineCommand {
        &self.command
    }

    pub fn engine(&self) -> Engine {
        self.command.engine
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        // A poisoned lock only means another thread panicked mid-update; the
        // bookkeeping is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> ProcessError {
        ProcessError::Io {
            name: self.command.name.clone(),
            path: path.to_path_buf(),
            source,
        }
    }

    fn spawn(&self) -> Result<Child, ProcessError> {
        let cmd = &self.command;
        fs::create_dir_all(&cmd.work_dir).map_err(|e| self.io_error(&cmd.work_dir, e))?;

        let stdout_path = cmd.stdout_path();
        let stdout = File::create(&stdout_path).map_err(|e| self.io_error(&stdout_path, e))?;
        let stderr_path = cmd.stderr_path();
        let stderr = File::create(&stderr_path).map_err(|e| self.io_error(&stderr_path, e))?;

        Command::new(&cmd.exe)
            .args(&cmd.args)
            .envs(&cmd.env)
            .current_dir(&cmd.work_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| ProcessError::Spawn {
                name: cmd.name.clone(),
                exe: cmd.exe.display().to_string(),
                source: e,
            })
    }
}

impl JobHandle for EngineProcess {
    fn name(&self) -> &str {
        &self.command.name
    }

    fn package_name(&self) -> &str {
        self.command.engine.package_name()
    }

    fn work_dir(&self) -> &Path {
        &self.command.work_dir
    }

    fn start(&self) -> Result<(), ProcessError> {
        let mut state = self.lock();
        state.refresh(&self.command.name);
        if state.child.is_some() {
            return Err(ProcessError::AlreadyRunning {
                name: self.command.name.clone(),
            });
        }

        state.killed = false;
        match self.spawn() {
            Ok(child) => {
                debug!(
                    "Started {} process '{}' (pid {}) in {:?}.",
                    self.command.engine,
                    self.command.name,
                    child.id(),
                    self.command.work_dir
                );
                state.child = Some(child);
                state.started_at = Some(Instant::now());
                state.is_error = false;
                Ok(())
            }
            Err(e) => {
                state.is_error = true;
                Err(e)
            }
        }
    }

    fn wait(&self) {
        loop {
            {
                let mut state = self.lock();
                state.refresh(&self.command.name);
                if state.child.is_none() {
                    return;
                }
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    fn kill(&self) -> Result<(), ProcessError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.refresh(&self.command.name);
        let Some(child) = state.child.as_mut() else {
            return Ok(());
        };

        state.killed = true;
        let kill_result = child.kill();
        let status = child.wait().ok();
        state.finish(&self.command.name, status);

        kill_result.map_err(|e| ProcessError::Kill {
            name: self.command.name.clone(),
            source: e,
        })
    }

    fn is_running(&self) -> bool {
        let mut state = self.lock();
        state.refresh(&self.command.name);
        state.child.is_some()
    }

    fn is_error(&self) -> bool {
        let mut state = self.lock();
        state.refresh(&self.command.name);
        state.is_error
    }

    fn run_time(&self) -> Duration {
        self.lock().run_time()
    }

    fn clone_with_work_dir(&self, work_dir: &Path) -> Result<Arc<dyn JobHandle>, ProcessError> {
        let command = EngineCommand {
            work_dir: work_dir.to_path_buf(),
            ..self.command.clone()
        };
        Ok(Arc::new(EngineProcess::new(command)))
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(child) = state.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
