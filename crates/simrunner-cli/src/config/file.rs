use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileRunnerConfig {
    pub name: Option<String>,
    #[serde(rename = "work-dir")]
    pub work_dir: Option<PathBuf>,
    pub mode: Option<String>,
    #[serde(rename = "batch-size")]
    pub batch_size: Option<usize>,
    #[serde(rename = "max-retries")]
    pub max_retries: Option<usize>,
    /// Seconds between status sweeps.
    #[serde(rename = "poll-interval")]
    pub poll_interval: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub runner: Option<FileRunnerConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;

        // A relative work-dir is taken relative to the file declaring it.
        if let Some(runner) = config.runner.as_mut() {
            if let Some(work_dir) = runner.work_dir.as_mut() {
                if work_dir.is_relative() {
                    let base = path.parent().unwrap_or_else(|| Path::new("."));
                    *work_dir = base.join(&*work_dir);
                }
            }
        }

        Ok(config)
    }
}
