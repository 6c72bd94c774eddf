//! FlowRunner CLI Entry Point
//!
//! Starts one workflow in the background, tails its log lines until it
//! finishes and prints the final status.
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow from ./workflows
//! flowrunner greet --input who=Ada
//!
//! # Typed inputs are parsed as JSON
//! flowrunner resize --input width=640 --input keep_aspect=true
//!
//! # Give up (and cancel) after 30 seconds
//! flowrunner long_job --timeout 30
//!
//! # List available workflows
//! flowrunner --list --workflows-dir /srv/workflows
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use log::{error, info, warn};
use serde_json::Value;

use flowrunner::execution::{CommandRunner, Executor, WorkflowInputs};
use flowrunner::logs::LogTail;
use flowrunner::workflow::WorkflowCatalog;
use flowrunner::{ServiceConfig, StatusSnapshot, TaskStatus, APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    workflow_name: Option<String>,
    inputs: WorkflowInputs,
    workflows_dir: Option<PathBuf>,
    log_file: Option<PathBuf>,
    poll_ms: Option<u64>,
    timeout: Option<Duration>,
    working_dir: Option<PathBuf>,
    list: bool,
    verbose: bool,
}

impl Config {
    /// Applies command-line overrides on top of the environment config.
    fn service_config(&self, mut service: ServiceConfig) -> ServiceConfig {
        if let Some(dir) = &self.workflows_dir {
            service.workflows_dir = dir.clone();
        }
        if let Some(file) = &self.log_file {
            service.log_file = Some(file.clone());
        }
        if let Some(ms) = self.poll_ms {
            service.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(dir) = &self.working_dir {
            service.working_dir = Some(dir.clone());
        }
        service
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Background Workflow Execution Service");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: flowrunner [OPTIONS] <WORKFLOW_NAME>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_NAME>        Name declared inside a workflow definition");
    println!();
    println!("Options:");
    println!("  --input KEY=VALUE      Workflow input; VALUE is parsed as JSON, else kept as text");
    println!("  --workflows-dir PATH   Directory of workflow definitions (default: workflows)");
    println!("  --log-file PATH        Shared run log file");
    println!("  --poll-ms N            Log polling interval in milliseconds");
    println!("  --timeout SECS         Cancel the run after SECS seconds");
    println!("  --working-dir PATH     Directory the workflow's commands run in");
    println!("  --list                 List available workflows and exit");
    println!("  --verbose              Enable debug logging");
    println!("  --help                 Show this help message");
    println!("  --version              Show version information");
    println!();
    println!("Environment:");
    println!("  FLOWRUNNER_WORKFLOWS_DIR, FLOWRUNNER_LOG_FILE, FLOWRUNNER_RETENTION_SECS,");
    println!("  FLOWRUNNER_POLL_MS, FLOWRUNNER_WORKING_DIR");
    println!();
    println!("Examples:");
    println!("  flowrunner greet --input who=Ada");
    println!("  flowrunner long_job --timeout 30 --log-file /tmp/runs.log");
}

/// Parses `KEY=VALUE`; the value is JSON if it parses, otherwise a string.
fn parse_input(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Input must look like KEY=VALUE: {}", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Input has an empty key: {}", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Returns the value following an option.
fn option_value<'a>(args: &'a [String], i: &mut usize, option: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--list" => config.list = true,
            "--verbose" | "-v" => config.verbose = true,
            "--input" | "-i" => {
                let (key, value) = parse_input(option_value(args, &mut i, arg)?)?;
                config.inputs.insert(key, value);
            }
            "--workflows-dir" => {
                config.workflows_dir = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--log-file" => {
                config.log_file = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--working-dir" => {
                config.working_dir = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--poll-ms" => {
                let raw = option_value(args, &mut i, arg)?;
                config.poll_ms = Some(
                    raw.parse()
                        .map_err(|_| format!("Invalid poll interval: {}", raw))?,
                );
            }
            "--timeout" => {
                let raw = option_value(args, &mut i, arg)?;
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| format!("Invalid timeout: {}", raw))?;
                config.timeout = Some(Duration::from_secs(secs));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.workflow_name.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.workflow_name = Some(arg.clone());
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Checks that the working directory exists.
fn check_working_directory(dir: &Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(dir) = dir else {
        info!("Working directory: {}", env::current_dir()?.display());
        return Ok(());
    };

    if !dir.exists() {
        return Err(format!("Working directory does not exist: {}", dir.display()).into());
    }

    if !dir.is_dir() {
        return Err(format!("Path is not a directory: {}", dir.display()).into());
    }

    info!("Working directory: {}", dir.display());
    Ok(())
}

fn print_workflows(catalog: &WorkflowCatalog) {
    if catalog.is_empty() {
        println!("No workflows found.");
        return;
    }

    println!("Available workflows:");
    for name in catalog.names() {
        let description = catalog
            .get(name)
            .map_or("", |w| w.description.as_str());
        println!("  {:<24} {}", name.bold(), description);
    }
}

fn print_status(snapshot: &StatusSnapshot) {
    let label = match snapshot.status {
        TaskStatus::Completed => snapshot.status.as_str().to_uppercase().green(),
        TaskStatus::Failed => snapshot.status.as_str().to_uppercase().red(),
        TaskStatus::Cancelled => snapshot.status.as_str().to_uppercase().yellow(),
        _ => snapshot.status.as_str().to_uppercase().normal(),
    };

    println!();
    println!("Workflow '{}' finished: {}", snapshot.workflow, label.bold());
    if let Some(err) = &snapshot.error {
        println!("Error: {}", err.red());
    }
}

/// Main application entry point. Returns whether the run completed.
async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    let service = config.service_config(ServiceConfig::from_env());
    check_working_directory(&service.working_dir)?;

    // Load workflows
    let catalog = WorkflowCatalog::load_dir(&service.workflows_dir).map_err(|e| {
        error!("Failed to load workflows: {}", e);
        e
    })?;

    if config.list {
        print_workflows(&catalog);
        return Ok(true);
    }

    let Some(workflow_name) = config.workflow_name.clone() else {
        print_usage();
        return Err("No workflow name given".into());
    };

    print_banner();

    // Build the executor
    let mut runner = CommandRunner::new(Arc::new(catalog));
    if let Some(dir) = &service.working_dir {
        runner = runner.with_working_dir(dir);
    }
    let executor = Executor::new(Arc::new(runner), service.open_sink()?)
        .with_config(service.executor_config());

    let started = executor.start(&workflow_name, config.inputs.clone())?;
    println!(
        "Started '{}' as task {}",
        started.workflow.cyan(),
        started.task_id.to_string().bold()
    );
    if let Some(path) = &service.log_file {
        println!("Log: {}", path.display());
    }
    println!();

    let mut tail = LogTail::new(Arc::clone(executor.sink()), started.log_position)
        .only_task(&started.task_id);
    let mut tailing = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let deadline = async {
        match config.timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut interval = tokio::time::interval(service.poll_interval);
    let mut cancel_sent = false;

    let snapshot = loop {
        tokio::select! {
            _ = interval.tick() => {}
            result = &mut ctrl_c, if !cancel_sent => {
                result?;
                warn!("Interrupted; cancelling task {}", started.task_id);
                executor.cancel(&started.task_id);
                cancel_sent = true;
            }
            _ = &mut deadline, if !cancel_sent => {
                warn!("Timed out; cancelling task {}", started.task_id);
                executor.cancel(&started.task_id);
                cancel_sent = true;
            }
        }

        // Status before logs, so a terminal status comes with its last line.
        let snapshot = executor.status(&started.task_id)?;

        if tailing {
            match tail.poll() {
                Ok(lines) => lines.iter().for_each(|line| println!("{}", line)),
                Err(e) => {
                    warn!("Stopped tailing the run log: {}", e);
                    tailing = false;
                }
            }
        }

        if snapshot.status.is_terminal() {
            break snapshot;
        }
    };

    executor.shutdown().await;

    print_status(&snapshot);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(snapshot.status == TaskStatus::Completed)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
