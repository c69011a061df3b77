use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strand_a2a::DelegationClient;
use strand_core::config::AppConfig;
use strand_core::types::generate_id;
use strand_core::workflow::WorkflowDefinition;
use strand_engine::publish::{sse, RunManager, RunPublisher};
use strand_engine::{validate, Admission, RetryPolicy, Runner, StepExecutors};
use strand_llm::ProviderRegistry;
use strand_tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "strand", version, about = "Workflow graph runner for AI agents and tools")]
struct Cli {
    /// Path to config file (defaults to ./strand.toml when present)
    #[arg(short, long, env = "STRAND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow and stream its events to stdout
    Run {
        /// Workflow definition (.json or .toml)
        workflow: PathBuf,
        /// Input for an intake step, as `step_id=value`
        #[arg(short, long = "input", value_name = "STEP=VALUE")]
        inputs: Vec<String>,
    },
    /// Check a workflow without running it
    Validate {
        /// Workflow definition (.json or .toml)
        workflow: PathBuf,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the event stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strand=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "strand", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { workflow, inputs } => run(&config, &workflow, &inputs).await,
        Commands::Validate { workflow } => validate_workflow(&config, &workflow),
        Commands::Completions { .. } => Ok(()),
    }
}

struct Engine {
    runner: Runner,
    providers: Arc<RwLock<ProviderRegistry>>,
    tools: Arc<RwLock<ToolRegistry>>,
}

fn build_engine(config: &AppConfig) -> anyhow::Result<Engine> {
    let providers = ProviderRegistry::from_config(&config.providers)?;
    info!(providers = ?providers.list(), "Providers registered");

    let tools = ToolRegistry::with_builtins().with_timeout_cap(config.engine.tool_timeout_secs);
    let delegation = DelegationClient::new(Duration::from_secs(config.delegate.timeout_secs))?;

    let providers = Arc::new(RwLock::new(providers));
    let tools = Arc::new(RwLock::new(tools));
    let executors = StepExecutors::new(
        Arc::clone(&providers),
        Arc::clone(&tools),
        Arc::new(delegation),
    )
    .with_limits(config.engine.clone());

    Ok(Engine {
        runner: Runner::new(executors),
        providers,
        tools,
    })
}

fn load_workflow(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    WorkflowDefinition::load(path).with_context(|| format!("loading workflow {}", path.display()))
}

/// Parse `step=value` pairs. Values that are valid JSON objects or arrays
/// are passed structurally; everything else is a string.
fn parse_inputs(raw: &[String]) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let mut inputs = HashMap::new();
    for pair in raw {
        let Some((step, value)) = pair.split_once('=') else {
            bail!("invalid --input {:?}: expected STEP=VALUE", pair);
        };
        let step = step.trim();
        if step.is_empty() {
            bail!("invalid --input {:?}: empty step id", pair);
        }
        let trimmed = value.trim_start();
        let value = if trimmed.starts_with('{') || trimmed.starts_with('[') {
            serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
        } else {
            serde_json::Value::String(value.to_string())
        };
        inputs.insert(step.to_string(), value);
    }
    Ok(inputs)
}

async fn run(config: &AppConfig, workflow_path: &Path, raw_inputs: &[String]) -> anyhow::Result<()> {
    let workflow = load_workflow(workflow_path)?;
    let inputs = parse_inputs(raw_inputs)?;
    let engine = build_engine(config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; cancelling run");
                cancel.cancel();
            }
        });
    }

    let admission = Admission::new(&config.admission);
    let _permit = admission.acquire(&workflow.name, &cancel).await?;

    let manager = Arc::new(RunManager::new(Duration::from_secs(config.publisher.ttl_secs)));
    let gc = manager.spawn_gc(cancel.child_token());
    let publisher = RunPublisher::new(Arc::clone(&manager));
    let run_id = generate_id("run");
    manager.register(&run_id).await;

    let policy = RetryPolicy::new(config.retry.clone());
    let handle = match policy.start(&engine.runner, &workflow, inputs, cancel.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            publisher.reject(&run_id, &e.to_string()).await;
            return Err(e.into());
        }
    };
    info!(run_id = %run_id, session_id = %handle.session_id, workflow = %workflow.name, "Run started");

    let Some(frames) = sse::follow(Arc::clone(&manager), &run_id, 0).await else {
        bail!("run {} is not tracked", run_id);
    };
    let mut frames = Box::pin(frames);
    let publishing = {
        let run_id = run_id.clone();
        tokio::spawn(async move { publisher.publish(&run_id, handle).await })
    };

    while let Some(frame) = frames.next().await {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(frame.as_bytes())?;
        stdout.flush()?;
    }

    let outcome = publishing.await?;
    gc.abort();

    match outcome {
        Some(result) if result.succeeded() => Ok(()),
        Some(result) => bail!("run failed: {}", result.failed_steps().join(", ")),
        None => bail!("run ended without a result"),
    }
}

fn validate_workflow(config: &AppConfig, workflow_path: &Path) -> anyhow::Result<()> {
    let workflow = load_workflow(workflow_path)?;
    let engine = build_engine(config)?;
    let providers = engine.providers.try_read()?;
    let tools = engine.tools.try_read()?;
    let report = validate(&workflow, &providers, &tools)?;

    println!("{} ({} steps)", workflow.name, report.order.len());
    println!("  order: {}", report.order.join(" -> "));
    if !report.intake_steps.is_empty() {
        println!("  inputs: {}", report.intake_steps.join(", "));
    }
    for problem in &report.problems {
        println!("  problem: {}", problem);
    }

    if !report.is_ok() {
        bail!("{} problem(s) found", report.problems.len());
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inputs_parse_strings_and_json() {
        let raw = vec![
            "topic=ownership and borrowing".to_string(),
            r#"data={"n": 1}"#.to_string(),
            "eq=a=b".to_string(),
        ];
        let inputs = parse_inputs(&raw).unwrap();
        assert_eq!(inputs["topic"], json!("ownership and borrowing"));
        assert_eq!(inputs["data"], json!({"n": 1}));
        assert_eq!(inputs["eq"], json!("a=b"));
    }

    #[test]
    fn inputs_reject_missing_separator() {
        assert!(parse_inputs(&["novalue".to_string()]).is_err());
        assert!(parse_inputs(&["=x".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_run_command() {
        let cli = Cli::try_parse_from([
            "strand", "run", "wf.json", "-i", "topic=rust", "--input", "tone=dry",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { workflow, inputs } => {
                assert_eq!(workflow, PathBuf::from("wf.json"));
                assert_eq!(inputs, vec!["topic=rust", "tone=dry"]);
            }
            _ => panic!("expected run"),
        }
    }
}
