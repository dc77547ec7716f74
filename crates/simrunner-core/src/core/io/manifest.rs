use crate::core::process::JobHandle;
use crate::core::process::engine::{Engine, EngineCommand, EngineProcess};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid job manifest '{path}': {message}")]
    Invalid { path: String, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(rename = "job", default)]
    jobs: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct JobEntry {
    name: String,
    engine: Option<String>,
    exe: PathBuf,
    #[serde(default)]
    args: Vec<String>,
    work_dir: Option<PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// A list of engine jobs loaded from a TOML file.
///
/// Each `[[job]]` table names one run. Relative working directories resolve
/// against the manifest's own directory; a missing `work-dir` defaults to a
/// directory named after the job.
#[derive(Debug, Clone)]
pub struct JobManifest {
    pub path: PathBuf,
    pub commands: Vec<EngineCommand>,
}

impl JobManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, path, base_dir)
    }

    pub fn from_toml_str(
        content: &str,
        path: &Path,
        base_dir: &Path,
    ) -> Result<Self, ManifestError> {
        let path_str = path.to_string_lossy().to_string();
        let file: ManifestFile = toml::from_str(content).map_err(|e| ManifestError::Toml {
            path: path_str.clone(),
            source: e,
        })?;

        let invalid = |message: String| ManifestError::Invalid {
            path: path_str.clone(),
            message,
        };

        if file.jobs.is_empty() {
            return Err(invalid("no [[job]] entries found".to_string()));
        }

        let mut seen = HashSet::new();
        let mut commands = Vec::with_capacity(file.jobs.len());
        for entry in file.jobs {
            if entry.name.trim().is_empty() {
                return Err(invalid("job names cannot be empty".to_string()));
            }
            if !seen.insert(entry.name.clone()) {
                return Err(invalid(format!("duplicate job name '{}'", entry.name)));
            }
            if entry.exe.as_os_str().is_empty() {
                return Err(invalid(format!("job '{}' has an empty 'exe'", entry.name)));
            }

            let engine = match entry.engine.as_deref() {
                Some(name) => name
                    .parse::<Engine>()
                    .map_err(|e| invalid(format!("job '{}': {}", entry.name, e)))?,
                None => Engine::Generic,
            };

            let work_dir = match entry.work_dir {
                Some(dir) if dir.is_absolute() => dir,
                Some(dir) => base_dir.join(dir),
                None => base_dir.join(&entry.name),
            };

            commands.push(EngineCommand {
                name: entry.name,
                engine,
                exe: entry.exe,
                args: entry.args,
                work_dir,
                env: entry.env,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            commands,
        })
    }

    pub fn into_processes(self) -> Vec<Arc<dyn JobHandle>> {
        self.commands
            .into_iter()
            .map(|cmd| Arc::new(EngineProcess::new(cmd)) as Arc<dyn JobHandle>)
            .collect()
    }
}
