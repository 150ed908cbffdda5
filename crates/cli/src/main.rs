//! `pipeline-runner` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` checks a workflow JSON file and prints its layers.
//! - `run` executes a workflow with the built-in node services.
//! - `connect` checks whether a new connection could be added to a workflow.
//! - `types` lists the registered node types and their ports.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use engine::{validate_connection, validate_graph, EngineConfig, PipelineEngine, RunStatus, Workflow};
use nodes::builtin::register_builtin_services;
use nodes::{Connection, MemoryContext, RetryConfig, ServiceRegistry};
use serde_json::{json, Map};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pipeline-runner",
    about = "Layered workflow execution engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow and print the final run state as JSON.
    Run {
        path: PathBuf,
        /// Retry budget applied to every node, replacing each service's own.
        #[arg(long, env = "PIPELINE_MAX_RETRIES")]
        max_retries: Option<u32>,
        /// Base backoff in milliseconds (only used with --max-retries).
        #[arg(long, env = "PIPELINE_BACKOFF_MS", default_value_t = 1000)]
        backoff_ms: u64,
    },
    /// Check whether a connection may be added to a workflow.
    Connect {
        path: PathBuf,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        from_port: Option<String>,
        #[arg(long)]
        to_port: Option<String>,
    },
    /// List registered node types and their port schemas.
    Types,
}

fn builtin_registry() -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    register_builtin_services(&mut registry);
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let workflow = Workflow::load(&path)
                .with_context(|| format!("cannot load workflow {}", path.display()))?;

            match validate_graph(&workflow.nodes, &workflow.connections) {
                Ok(layers) => {
                    println!("Workflow '{}' is valid.", workflow.name);
                    for (index, layer) in layers.iter().enumerate() {
                        println!("  layer {index}: {}", layer.join(", "));
                    }
                }
                Err(e) => bail!("validation failed: {e}"),
            }
        }
        Command::Run {
            path,
            max_retries,
            backoff_ms,
        } => {
            let workflow = Workflow::load(&path)
                .with_context(|| format!("cannot load workflow {}", path.display()))?;
            let config = EngineConfig {
                retry_override: max_retries.map(|max_retries| RetryConfig {
                    max_retries,
                    backoff_ms,
                    ..RetryConfig::default()
                }),
            };

            info!("running workflow '{}'", workflow.name);
            let store = Arc::new(MemoryContext::new(&workflow.nodes));
            let ids: Vec<String> = workflow.nodes.iter().map(|node| node.id.clone()).collect();
            let engine = PipelineEngine::new(
                workflow.nodes,
                workflow.connections,
                Arc::new(builtin_registry()),
                store.clone(),
            )
            .with_config(config);

            let state = engine.run().await;

            let mut outputs = Map::new();
            for id in ids {
                if let Some(data) = store.data(&id) {
                    outputs.insert(id, data);
                }
            }
            let report = json!({ "state": state, "outputs": outputs });
            println!("{}", serde_json::to_string_pretty(&report)?);

            if state.status != RunStatus::Completed {
                bail!("pipeline finished with status {:?}", state.status);
            }
        }
        Command::Connect {
            path,
            from,
            to,
            from_port,
            to_port,
        } => {
            let workflow = Workflow::load(&path)
                .with_context(|| format!("cannot load workflow {}", path.display()))?;
            let candidate = Connection {
                from,
                to,
                from_port,
                to_port,
            };

            validate_connection(&candidate, &workflow.nodes, &workflow.connections, &builtin_registry())
                .with_context(|| format!("cannot connect {} -> {}", candidate.from, candidate.to))?;
            println!(
                "Connection {}:{} -> {}:{} is valid.",
                candidate.from,
                candidate.from_port_key(),
                candidate.to,
                candidate.to_port_key()
            );
        }
        Command::Types => {
            let registry = builtin_registry();
            let mut listing = Map::new();
            for node_type in registry.registered_types() {
                if let Some(service) = registry.get(&node_type) {
                    listing.insert(
                        node_type,
                        json!({
                            "inputs": service.input_schema(),
                            "outputs": service.output_schema(),
                            "retry": service.retry_config(),
                        }),
                    );
                }
            }
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
    }

    Ok(())
}
