use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use parking_lot::Mutex;

use flowcanvas::backend::HttpBackend;
use flowcanvas::config::Config;
use flowcanvas::engine::{
    ExecutionStatus, NodeStatus, ScheduleOptions, Scheduler, WorkflowExecution,
};
use flowcanvas::shutdown::ShutdownCoordinator;
use flowcanvas::telemetry::{init_telemetry, shutdown_telemetry, OtelConfig};
use flowcanvas::workflow::{parse_graph_file, render_layers, validate_graph, Graph};

#[derive(Parser)]
#[command(name = "flowcanvas")]
#[command(about = "Run node-based image and video generation workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow file for structural errors and cycles
    Validate {
        /// Path to workflow JSON/YAML file
        file: String,
    },
    /// Show the execution order and parallel layers
    Plan {
        /// Path to workflow JSON/YAML file
        file: String,
    },
    /// Run every generator node of a workflow
    Run {
        /// Path to workflow JSON/YAML file
        file: String,
        /// Run nodes one at a time instead of layer by layer
        #[arg(long)]
        sequential: bool,
        /// Abort on the first failed node
        #[arg(long)]
        stop_on_error: bool,
        /// Resume from this generator node
        #[arg(long = "from")]
        from: Option<String>,
        /// Override the back-end base URL
        #[arg(long)]
        backend_url: Option<String>,
        /// Print the execution record as JSON
        #[arg(long)]
        json: bool,
        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let provider = init_telemetry(&OtelConfig::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan { file } => cmd_plan(&file),
        Commands::Run {
            file,
            sequential,
            stop_on_error,
            from,
            backend_url,
            json,
            metrics,
        } => {
            let options = ScheduleOptions::new()
                .parallel(!sequential)
                .stop_on_error(stop_on_error);
            let options = match from {
                Some(node_id) => options.start_from(node_id),
                None => options,
            };
            cmd_run(&file, options, backend_url, json, metrics).await
        }
        Commands::Completions { shell } => cmd_completions(shell),
    };

    shutdown_telemetry(provider);
    result
}

/// Shell completion variants
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

fn cmd_completions(shell: CompletionShell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let shell: Shell = shell.into();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}

fn load_graph(file: &str) -> anyhow::Result<Graph> {
    let path = Path::new(file);
    if !path.exists() {
        anyhow::bail!("File not found: {}", file);
    }
    Ok(parse_graph_file(path)?)
}

fn cmd_validate(file: &str) -> anyhow::Result<()> {
    let graph = load_graph(file)?;
    validate_graph(&graph)?;

    let sorted = graph.topo_sort();
    if let Some(path) = sorted.cycle_path {
        anyhow::bail!(flowcanvas::Error::CycleDetected { path });
    }

    println!("✓ Workflow '{}' is valid", file);
    println!();
    println!("  Nodes: {}", graph.nodes.len());
    println!("  Edges: {}", graph.edges.len());
    println!("  Generators: {}", graph.generator_ids().len());

    Ok(())
}

fn cmd_plan(file: &str) -> anyhow::Result<()> {
    let graph = load_graph(file)?;
    validate_graph(&graph)?;

    let sorted = graph.topo_sort();
    if !sorted.has_cycle {
        println!("Order: {}", sorted.order.join(" -> "));
        println!();
    }
    println!("{}", render_layers(&graph));

    Ok(())
}

async fn cmd_run(
    file: &str,
    options: ScheduleOptions,
    backend_url: Option<String>,
    json: bool,
    metrics: bool,
) -> anyhow::Result<()> {
    let graph = load_graph(file)?;

    let mut config = Config::load();
    if let Some(url) = backend_url {
        config.backend.base_url = url;
    }
    if metrics {
        flowcanvas::metrics::init_metrics();
    }

    let backend = Arc::new(HttpBackend::new(&config.backend));
    let scheduler = Arc::new(Scheduler::new(backend, config.engine.clone()));

    let shutdown = ShutdownCoordinator::new();
    shutdown.start_signal_listener();
    let watcher = shutdown.cancel_on_shutdown(scheduler.clone());

    let options = if json {
        options
    } else {
        println!("Running '{}' against {}...", file, config.backend.base_url);
        options.on_progress(status_printer())
    };

    let execution = scheduler.execute(&graph, options).await;
    watcher.abort();
    let execution = match execution {
        Ok(execution) => execution,
        Err(e) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&e.to_json())?);
            } else if e.is_preflight() {
                println!("✗ Workflow not started, no jobs were submitted [{}]", e.code());
            }
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        print_summary(&execution);
    }
    if metrics {
        println!();
        print!("{}", flowcanvas::metrics::render_metrics());
    }

    if execution.status != ExecutionStatus::Completed {
        anyhow::bail!("Execution {}", execution.status);
    }
    Ok(())
}

/// Print one line each time a node changes status.
fn status_printer() -> Arc<dyn Fn(&WorkflowExecution) + Send + Sync> {
    let last_seen: Mutex<HashMap<String, NodeStatus>> = Mutex::new(HashMap::new());

    Arc::new(move |execution: &WorkflowExecution| {
        let mut last_seen = last_seen.lock();
        for node_id in &execution.execution_order {
            let Some(result) = execution.result(node_id) else {
                continue;
            };
            if last_seen.get(node_id) == Some(&result.status) {
                continue;
            }
            last_seen.insert(node_id.clone(), result.status);

            match result.status {
                NodeStatus::Pending => {}
                NodeStatus::Running => println!("  … {}", node_id),
                NodeStatus::Success => println!(
                    "  ✓ {} -> {}",
                    node_id,
                    result.output_ref.as_deref().unwrap_or("")
                ),
                NodeStatus::Failed => println!(
                    "  ✗ {}: {}",
                    node_id,
                    result.error.as_deref().unwrap_or("failed")
                ),
                NodeStatus::Skipped => println!("  - {} (skipped)", node_id),
            }
        }
    })
}

fn print_summary(execution: &WorkflowExecution) {
    println!();
    println!("Execution ID: {}", execution.id);
    println!("Status: {}", execution.status);
    println!(
        "Completed: {}/{}",
        execution.completed_nodes.len(),
        execution.execution_order.len()
    );

    if let Some(node) = &execution.failed_node {
        println!("Failed node: {}", node);
    }
    if let Some(error) = &execution.error {
        println!("Error: {}", error);
    }
    if let Some(finished) = execution.completed_at {
        let duration = finished - execution.started_at;
        println!("Duration: {}ms", duration.num_milliseconds());
    }
}
