use crate::cli::RunArgs;
use crate::config::build_config;
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use simrunner::core::io::manifest::JobManifest;
use simrunner::core::io::report::write_status_report_to_path;
use simrunner::core::models::status::{JobState, JobStatus};
use simrunner::engine::progress::ProgressReporter;
use simrunner::workflows::runner::{ProcessRunner, StartOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Starting run command...");

    let app_config = build_config(&args.runner)?;
    debug!("Resolved configuration: {:?}", app_config);

    info!("Loading job manifest from {:?}", &app_config.manifest_path);
    let manifest = JobManifest::load(&app_config.manifest_path)?;
    let processes = manifest.into_processes();

    let progress_handler = CliProgressHandler::new(ui_sender.clone());
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    let runner = Arc::new(
        ProcessRunner::new(
            processes,
            app_config.runner_name.clone(),
            app_config.work_dir.clone(),
        )?
        .with_progress(reporter),
    );
    info!("{}", runner);

    if runner.start_all(app_config.scheduler.clone())? == StartOutcome::AlreadyRunning {
        return Err(CliError::Argument(format!(
            "runner '{}' is already running",
            runner.name()
        )));
    }

    let waiter = Arc::clone(&runner);
    let mut wait_task = tokio::task::spawn_blocking(move || waiter.wait());

    let finished_first = tokio::select! {
        result = &mut wait_task => Some(result),
        _ = interrupted() => None,
    };
    let join_result = match finished_first {
        Some(result) => result,
        None => {
            warn!("Interrupt received; killing all processes of '{}'.", runner.name());
            ui_sender
                .send(UiEvent::Log("⚠ Interrupt received, killing all processes...".to_string()))
                .await
                .ok();
            kill_all_blocking(Arc::clone(&runner)).await?;
            wait_task.await
        }
    };
    let summary = join_result
        .map_err(|e| CliError::Other(anyhow::anyhow!("Runner wait task failed: {}", e)))?;

    let statuses = runner.statuses();
    println!("{}", render_summary(runner.name(), &statuses));

    if let Some(report_path) = &args.report {
        write_status_report_to_path(&statuses, report_path)?;
        info!("Status report written to {:?}", report_path);
        println!("📄 Status report written to {}", report_path.display());
    }

    if summary.is_some_and(|s| s.killed) {
        return Err(CliError::Interrupted);
    }

    let failed = statuses.iter().filter(|s| s.is_error).count();
    if failed > 0 {
        return Err(CliError::JobsFailed {
            failed,
            total: statuses.len(),
        });
    }

    Ok(())
}

/// Kills every process off the async workers; each kill reaps its child synchronously.
async fn kill_all_blocking(runner: Arc<ProcessRunner>) -> Result<()> {
    tokio::task::spawn_blocking(move || runner.kill_all())
        .await
        .map_err(|e| CliError::Other(anyhow::anyhow!("Kill task failed: {}", e)))
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for the interrupt signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// One line per process followed by a totals line.
fn render_summary(runner_name: &str, statuses: &[JobStatus]) -> String {
    let mut out = format!("Summary for '{}':\n", runner_name);
    for status in statuses {
        let marker = match (status.state, status.is_error) {
            (JobState::Finished, false) => "✓",
            (_, true) => "✗",
            _ => "·",
        };
        out.push_str(&format!(
            "  {} [{}] {:<24} {:<10} retries={} time={:.1}s\n",
            marker,
            status.index,
            status.name,
            status.state,
            status.retries,
            status.run_time.as_secs_f64()
        ));
    }
    let succeeded = statuses.iter().filter(|s| s.succeeded()).count();
    out.push_str(&format!(
        "  {}/{} process(es) succeeded",
        succeeded,
        statuses.len()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn status(index: usize, name: &str, state: JobState, is_error: bool) -> JobStatus {
        JobStatus {
            index,
            name: name.to_string(),
            package: "GROMACS".to_string(),
            work_dir: PathBuf::from("/runs").join(name),
            state,
            retries: if is_error { 5 } else { 0 },
            is_running: false,
            is_error,
            run_time: Duration::from_millis(1500),
        }
    }

    #[test]
    fn summary_marks_each_outcome() {
        let statuses = vec![
            status(0, "lambda_0.0", JobState::Finished, false),
            status(1, "lambda_0.5", JobState::Errored, true),
            status(2, "lambda_1.0", JobState::Queued, false),
        ];

        let text = render_summary("fep", &statuses);

        assert!(text.starts_with("Summary for 'fep':"));
        assert!(text.contains("✓ [0] lambda_0.0"));
        assert!(text.contains("✗ [1] lambda_0.5"));
        assert!(text.contains("· [2] lambda_1.0"));
        assert!(text.contains("retries=5"));
        assert!(text.contains("time=1.5s"));
        assert!(text.ends_with("1/3 process(es) succeeded"));
    }

    #[test]
    fn summary_does_not_mark_an_interrupted_job_as_succeeded() {
        let statuses = vec![status(0, "lambda_0.0", JobState::Running, false)];

        let text = render_summary("fep", &statuses);

        assert!(text.contains("· [0] lambda_0.0"));
        assert!(!text.contains("✓"));
        assert!(text.ends_with("0/1 process(es) succeeded"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_all_blocking_stops_engine_processes_from_a_single_threaded_runtime() {
        use simrunner::core::process::JobHandle;
        use simrunner::core::process::engine::{Engine, EngineCommand, EngineProcess};
        use simrunner::engine::config::{RunMode, SchedulerConfigBuilder};

        let dir = tempfile::tempdir().unwrap();
        let process = EngineProcess::new(
            EngineCommand::new("sleepy", Engine::Generic, "/bin/sh", dir.path().join("sleepy"))
                .with_args(["-c", "sleep 5"]),
        );
        let runner = Arc::new(
            ProcessRunner::new(vec![Arc::new(process) as Arc<dyn JobHandle>], "fep", None)
                .unwrap(),
        );
        let config = SchedulerConfigBuilder::new()
            .mode(RunMode::Serial)
            .max_retries(1)
            .build()
            .unwrap();
        runner.start_all(config).unwrap();
        while runner.n_running() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        kill_all_blocking(Arc::clone(&runner)).await.unwrap();

        let waiter = Arc::clone(&runner);
        let summary = tokio::task::spawn_blocking(move || waiter.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(summary.killed);
        assert_eq!(runner.n_running(), 0);
        assert_eq!(runner.n_error(), 0);
        assert!(!runner.statuses()[0].succeeded());
    }

    #[test]
    fn summary_of_empty_run_reports_zero_totals() {
        let text = render_summary("empty", &[]);
        assert!(text.ends_with("0/0 process(es) succeeded"));
    }
}
