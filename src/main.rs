use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use waymark_core::config::WaymarkConfig;
use waymark_core::types::FlowEvent;
use waymark_engine::{Session, SimulatedBackend, StepOutcome};
use waymark_graph::Graph;

#[derive(Parser)]
#[command(name = "waymark", version, about = "Visual command graphs for automation backends")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "waymark.toml", env = "WAYMARK_CONFIG")]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a graph file for structural problems
    Validate {
        /// Graph file (JSON)
        graph: PathBuf,
    },
    /// Print the linear execution order
    Order {
        /// Graph file (JSON)
        graph: PathBuf,
    },
    /// Execute a graph against the built-in simulated backend
    Run {
        /// Graph file (JSON)
        graph: PathBuf,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "waymark=debug,waymark_engine=debug,waymark_graph=debug,warn"
    } else {
        "waymark=info,waymark_engine=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let config = WaymarkConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Validate { graph } => {
            let graph = load_graph(&graph)?;
            graph.validate()?;
            println!("ok: {} nodes, {} connections", graph.len(), graph.connections().len());
        }
        Commands::Order { graph } => {
            let graph = load_graph(&graph)?;
            for (i, id) in graph.execution_order()?.iter().enumerate() {
                let label = graph.node(id).map(|n| n.kind().label()).unwrap_or("?");
                println!("{:>3}. {} ({})", i + 1, label, id);
            }
        }
        Commands::Run { graph } => {
            let graph = load_graph(&graph)?;
            graph.validate()?;
            run_simulated(graph, &config).await?;
        }
    }

    Ok(())
}

fn load_graph(path: &Path) -> anyhow::Result<Graph> {
    let graph = Graph::load(path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", path.display(), e))?;
    info!(path = %path.display(), nodes = graph.len(), "Loaded graph");
    Ok(graph)
}

async fn run_simulated(graph: Graph, config: &WaymarkConfig) -> anyhow::Result<()> {
    let backend = Arc::new(SimulatedBackend::new(config.simulation.clone()));
    let session = Session::open(graph.shared(), backend, config);

    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                FlowEvent::NodeStarted { node_id, kind } => println!("> {kind} ({node_id})"),
                FlowEvent::NodeCompleted { elapsed_ms, .. } => println!("  done in {elapsed_ms}ms"),
                FlowEvent::TaskStateChanged { kind, from, to } => {
                    println!("  {kind}: {from:?} -> {to:?}")
                }
                FlowEvent::SensorEvaluated { node_id, value } => {
                    println!("  sensor {node_id} = {value}")
                }
                FlowEvent::RunFinished {
                    succeeded, reason, ..
                } => {
                    match reason {
                        Some(reason) if !succeeded => println!("stopped: {reason}"),
                        _ => println!("finished"),
                    }
                    break;
                }
                FlowEvent::RunStarted { .. } => {}
            }
        }
    });

    let executor = session.executor().clone();
    if let Err(e) = executor.start() {
        printer.abort();
        session.close().await;
        return Err(e.into());
    }

    let interrupt = executor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Interrupted, cancelling run");
        if let Err(e) = interrupt.cancel().await {
            warn!(error = %e, "Cancel failed");
        }
    });

    let mut result = Ok(());
    loop {
        match executor.step().await {
            Ok(StepOutcome::Advanced(_)) => {}
            Ok(StepOutcome::Finished) => break,
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    printer.await.ok();
    session.close().await;
    Ok(result?)
}
