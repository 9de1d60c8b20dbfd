use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spindle_core::config::RunnerSettings;
use spindle_core::event::ExecutionEvent;
use spindle_core::execution::UnitStatus;
use spindle_core::project::{ProjectDirs, ProjectFile};
use spindle_engine::{ExecutionEngine, RunContext};
use spindle_graph::ProjectModel;
use spindle_plan::ExecutionPlanner;

#[derive(Parser)]
#[command(
    name = "spindle",
    version,
    about = "Headless runner for workflow projects over parameter-value databases"
)]
struct Cli {
    /// Load the project at this directory, run all items, and exit non-zero
    /// on any failure
    #[arg(long, value_name = "PROJECT_DIR")]
    execute_only: Option<PathBuf>,

    /// Run this modifier script against the project directory before
    /// execution (the script gets the directory as its argument)
    #[arg(long, value_name = "SCRIPT", requires = "execute_only")]
    mod_script: Option<PathBuf>,

    /// Print the planned execution order for the project and exit
    #[arg(long, value_name = "PROJECT_DIR", conflicts_with = "execute_only")]
    list_items: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = settings_for(&cli)
        .and_then(|s| s.log_filter)
        .unwrap_or_else(|| "spindle=info,warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    if let Some(project_dir) = &cli.list_items {
        return list_items(project_dir);
    }
    if let Some(project_dir) = &cli.execute_only {
        return execute_only(project_dir, cli.mod_script.as_deref()).await;
    }

    Cli::command().print_help()?;
    println!();
    Ok(ExitCode::SUCCESS)
}

fn settings_for(cli: &Cli) -> Option<RunnerSettings> {
    let dir = cli.execute_only.as_ref().or(cli.list_items.as_ref())?;
    RunnerSettings::load(&ProjectDirs::new(dir).settings_file()).ok()
}

fn list_items(project_dir: &Path) -> anyhow::Result<ExitCode> {
    let project = ProjectFile::load(project_dir)?;
    let model = ProjectModel::from_project_file(&project, project_dir)?;
    let units = ExecutionPlanner::new(&model).plan(None)?;
    for unit in &units {
        println!("{}", unit.describe());
    }
    Ok(ExitCode::SUCCESS)
}

async fn execute_only(project_dir: &Path, mod_script: Option<&Path>) -> anyhow::Result<ExitCode> {
    if let Some(script) = mod_script {
        run_mod_script(script, project_dir).await?;
    }

    let project = ProjectFile::load(project_dir)?;
    let mut model = ProjectModel::from_project_file(&project, project_dir)?;
    let units = match ExecutionPlanner::new(&model).plan(None) {
        Ok(units) => units,
        Err(e) => {
            error!(error = %e, "Planning failed");
            return Ok(ExitCode::FAILURE);
        }
    };

    let settings = RunnerSettings::load(&ProjectDirs::new(project_dir).settings_file())?;
    let ctx = RunContext::new(ProjectDirs::new(project_dir), settings);
    let reporter = spawn_reporter(&ctx);

    let engine = ExecutionEngine::new(ctx);
    let summary = engine.run(&mut model, &units).await?;
    reporter.await.ok();

    let (ok, failed, skipped) = summary.counts();
    info!(ok, failed, skipped, elapsed_ms = summary.total_elapsed_ms, "Project run complete");
    if summary.succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// The modifier script edits the project file in place; a non-zero exit
/// aborts before anything is loaded.
async fn run_mod_script(script: &Path, project_dir: &Path) -> anyhow::Result<()> {
    info!(script = %script.display(), "Running modifier script");
    let status = tokio::process::Command::new(script)
        .arg(project_dir)
        .status()
        .await?;
    if !status.success() {
        anyhow::bail!(
            "modifier script {} exited with {}",
            script.display(),
            status.code().unwrap_or(-1)
        );
    }
    Ok(())
}

/// Console progress lines, fed from the engine's event stream.
fn spawn_reporter(ctx: &RunContext) -> tokio::task::JoinHandle<()> {
    let mut events = ctx.events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::UnitFinished {
                    item,
                    direction,
                    status,
                    ..
                } => {
                    let marker = match status {
                        UnitStatus::Succeeded => "ok",
                        UnitStatus::Failed => "FAILED",
                        UnitStatus::Skipped => "skipped",
                    };
                    println!("  {} [{}] ... {}", item, direction, marker);
                }
                ExecutionEvent::Diagnostic { item, message } => {
                    println!("  {}: {}", item, message);
                }
                ExecutionEvent::RunFinished { .. } => break,
                _ => {}
            }
        }
    })
}
