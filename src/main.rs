use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use foreman::config::Config;
use foreman::core::{Plan, Task};
use foreman::orchestration::worker::{EchoWorker, NoopInvoker, Worker};
use foreman::orchestration::{
    AttemptDriver, EmptyContext, Scheduler, SchedulerEvent, Selector, Validator,
};
use foreman::registry::{RoleRegistry, WorkerRegistry};
use foreman::{flog, Result};

/// Foreman - plan validation and task-execution engine
#[derive(Parser, Debug)]
#[command(name = "foreman")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    FOREMAN_DEBUG=1     Enable debug logging (alternative to --debug)")]
struct Cli {
    /// Enable debug logging (writes to ~/.foreman/foreman.log)
    #[arg(short = 'd', long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a plan file without executing it
    Validate {
        /// Path to the plan JSON file
        plan: PathBuf,
    },

    /// Execute a plan file with the built-in echo worker
    Run {
        /// Path to the plan JSON file
        plan: PathBuf,

        /// Worker registry JSON (omit for an empty registry)
        #[arg(long)]
        workers: Option<PathBuf>,

        /// Role registry JSON (omit for permissive defaults)
        #[arg(long)]
        roles: Option<PathBuf>,
    },
}

/// User-authored plan file: just the request and the tasks. Provenance
/// fields are filled in on load.
#[derive(Debug, Deserialize)]
struct PlanFile {
    request: String,
    tasks: Vec<Task>,
}

fn load_plan(path: &PathBuf) -> Result<Plan> {
    let file: PlanFile = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(Plan::new(file.request, 1, file.tasks))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    foreman::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Validate { plan } => run_validate(&plan),
        Command::Run { plan, workers, roles } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_plan(&plan, workers, roles))
        }
    }
}

fn run_validate(path: &PathBuf) -> Result<()> {
    let plan = load_plan(path)?;
    let errors = Validator::baseline().validate(&plan, &plan.request);
    if errors.is_empty() {
        println!("OK: {} tasks, no validation errors", plan.len());
        return Ok(());
    }
    println!("REJECTED: {} validation errors", errors.len());
    for error in &errors {
        println!("  {}", error);
    }
    std::process::exit(1);
}

async fn run_plan(
    path: &PathBuf,
    workers_path: Option<PathBuf>,
    roles_path: Option<PathBuf>,
) -> Result<()> {
    Config::ensure_dirs()?;
    let config = Config::load()?;

    let plan = load_plan(path)?;
    let errors = Validator::baseline().validate(&plan, &plan.request);
    if !errors.is_empty() {
        println!("plan failed validation; run `foreman validate` for details");
        std::process::exit(1);
    }

    let worker_registry = match workers_path {
        Some(p) => WorkerRegistry::load(&p)?,
        None => WorkerRegistry::empty(),
    };
    let role_registry = match roles_path {
        Some(p) => RoleRegistry::load(&p)?,
        None => RoleRegistry::default(),
    };

    // The CLI runs everything with the built-in echo worker; real
    // deployments register their own Worker implementations.
    let echo_id = config
        .default_worker
        .clone()
        .unwrap_or_else(|| "echo".to_string());
    let mut workers: HashMap<String, Arc<dyn Worker>> = HashMap::new();
    workers.insert(echo_id.clone(), Arc::new(EchoWorker::new(echo_id)));

    let selector = Arc::new(Selector::new(Arc::new(worker_registry), &config));
    let driver = Arc::new(AttemptDriver::new(Arc::new(NoopInvoker), &config));
    let (event_tx, mut event_rx) = mpsc::channel::<SchedulerEvent>(64);
    let cancel = CancellationToken::new();

    let scheduler = Scheduler::new(
        plan,
        Arc::new(role_registry),
        selector,
        driver,
        Arc::new(workers),
        Arc::new(EmptyContext),
        &config,
        event_tx,
        cancel.clone(),
    )?;

    // Ctrl-C cancels the run; in-flight tool calls get the configured
    // grace period.
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flog!("ctrl-c received, cancelling run");
            signal_cancel.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SchedulerEvent::TaskStarted { task_id } => println!("  running  {}", task_id),
                SchedulerEvent::TaskSucceeded {
                    task_id,
                    worker_id,
                    iterations,
                } => println!("  ok       {} ({}x {})", task_id, iterations, worker_id),
                SchedulerEvent::TaskFailed { task_id, reason } => {
                    println!("  failed   {} ({})", task_id, reason)
                }
                SchedulerEvent::TaskSkipped { task_id, reason } => {
                    println!("  skipped  {} ({})", task_id, reason)
                }
                SchedulerEvent::RunComplete { outcome } => {
                    println!("run complete: {:?}", outcome)
                }
            }
        }
    });

    let report = scheduler.run().await?;
    let _ = printer.await;

    let report_path = report.save(&Config::reports_dir()?)?;
    println!("report: {}", report_path.display());
    Ok(())
}
