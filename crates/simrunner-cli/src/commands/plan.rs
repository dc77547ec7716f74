use crate::cli::PlanArgs;
use crate::config::{AppConfig, build_config};
use crate::error::Result;
use simrunner::core::io::manifest::JobManifest;
use simrunner::core::process::JobHandle;
use simrunner::core::process::engine::EngineCommand;
use simrunner::engine::config::RunMode;
use simrunner::workflows::runner::ProcessRunner;
use std::sync::Arc;
use tracing::info;

pub async fn run(args: PlanArgs) -> Result<()> {
    let app_config = build_config(&args.runner)?;

    info!("Loading job manifest from {:?}", &app_config.manifest_path);
    let manifest = JobManifest::load(&app_config.manifest_path)?;
    let commands = manifest.commands.clone();

    // Building the runner performs the same relocation and collision checks as a real run.
    let runner = ProcessRunner::new(
        manifest.into_processes(),
        app_config.runner_name.clone(),
        app_config.work_dir.clone(),
    )?;

    println!("{}", render_plan(&app_config, &commands, &runner.processes()));
    Ok(())
}

fn render_plan(
    app_config: &AppConfig,
    commands: &[EngineCommand],
    processes: &[Arc<dyn JobHandle>],
) -> String {
    let scheduler = &app_config.scheduler;
    let mode = match scheduler.mode {
        RunMode::Serial => "serial".to_string(),
        RunMode::Parallel => format!("parallel (batch size {})", scheduler.concurrency),
    };

    let mut out = format!(
        "Runner '{}': {} process(es), mode {}, max retries {}, poll interval {:.1}s\n",
        app_config.runner_name,
        processes.len(),
        mode,
        scheduler.max_retries,
        scheduler.poll_interval.as_secs_f64()
    );
    for (index, (command, process)) in commands.iter().zip(processes).enumerate() {
        out.push_str(&format!(
            "  [{}] {} ({})\n      dir: {}\n      cmd: {}",
            index,
            command.name,
            command.engine.package_name(),
            process.work_dir().display(),
            command.exe.display()
        ));
        for arg in &command.args {
            out.push(' ');
            out.push_str(arg);
        }
        out.push('\n');
    }
    out
}
