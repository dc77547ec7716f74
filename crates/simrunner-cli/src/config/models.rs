use simrunner::engine::config::SchedulerConfig;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub manifest_path: PathBuf,
    pub runner_name: String,
    pub work_dir: Option<PathBuf>,
    pub scheduler: SchedulerConfig,
}
