use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileRunnerConfig};
use super::models::AppConfig;
use crate::cli::RunnerArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use simrunner::engine::config::{RunMode, SchedulerConfigBuilder};
use tracing::debug;

/// Resolves runner settings with precedence flags > `--set` > config file > defaults.
pub fn build_config(args: &RunnerArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let file_config = apply_set_values(file_config, &args.set_values)?;
    let runner_file = file_config.runner.unwrap_or_default();

    let runner_name = args
        .name
        .clone()
        .or(runner_file.name)
        .unwrap_or(defaults.name);

    let work_dir = args.work_dir.clone().or(runner_file.work_dir);

    let mode = match (args.mode.serial, args.mode.parallel) {
        (true, false) => RunMode::Serial,
        (false, true) => RunMode::Parallel,
        _ => match runner_file.mode.as_deref() {
            Some(value) => {
                parser::parse_run_mode(value).map_err(|e| CliError::Config(e.to_string()))?
            }
            None => defaults.mode,
        },
    };

    let max_retries = args
        .max_retries
        .or(runner_file.max_retries)
        .unwrap_or(defaults.max_retries);

    let poll_interval = match args.poll_interval.or(runner_file.poll_interval) {
        Some(seconds) => {
            parser::parse_poll_interval(seconds).map_err(|e| CliError::Argument(e.to_string()))?
        }
        None => defaults.poll_interval,
    };

    let mut builder = SchedulerConfigBuilder::new()
        .mode(mode)
        .max_retries(max_retries)
        .poll_interval(poll_interval);
    if let Some(batch_size) = args
        .batch_size
        .or(runner_file.batch_size)
        .or(defaults.batch_size)
    {
        builder = builder.concurrency(batch_size);
    }
    let scheduler = builder.build()?;

    debug!(
        "Resolved runner '{}' with {:?} (work dir: {:?})",
        runner_name, scheduler, work_dir
    );

    Ok(AppConfig {
        manifest_path: args.manifest.clone(),
        runner_name,
        work_dir,
        scheduler,
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    if set_values.is_empty() {
        return Ok(config);
    }
    for kv_pair in set_values {
        let (key, value_str) =
            parser::parse_key_value(kv_pair).map_err(|e| CliError::Config(e.to_string()))?;
        let runner = config
            .runner
            .get_or_insert_with(FileRunnerConfig::default);

        match key {
            "runner.name" => {
                runner.name = Some(value_str.to_string());
            }
            "runner.work-dir" => {
                runner.work_dir = Some(value_str.into());
            }
            "runner.mode" => {
                parser::parse_run_mode(value_str).map_err(|e| CliError::Config(e.to_string()))?;
                runner.mode = Some(value_str.to_string());
            }
            "runner.batch-size" => {
                runner.batch_size = Some(value_str.parse().map_err(|_| {
                    CliError::Config(format!("Invalid integer value for {}: {}", key, value_str))
                })?);
            }
            "runner.max-retries" => {
                runner.max_retries = Some(value_str.parse().map_err(|_| {
                    CliError::Config(format!("Invalid integer value for {}: {}", key, value_str))
                })?);
            }
            "runner.poll-interval" => {
                runner.poll_interval = Some(value_str.parse().map_err(|_| {
                    CliError::Config(format!("Invalid float value for {}: {}", key, value_str))
                })?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
