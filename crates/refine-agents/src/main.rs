//! Operator CLI for the refinement engine.
//!
//! ```bash
//! # One generate/evaluate/revise loop, printing the RunResult as JSON
//! refine-agents run --prompt "Summarise recent CRISPR delivery methods" --meta
//!
//! # Audit a stored history
//! refine-agents analyze history.json --content final.md
//!
//! # Overrides
//! REFINE_MODEL=local-model refine-agents --config refine.toml --strategy multi_expert run --prompt-file task.md
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evaluation::{EvaluationResult, StrategyKind, TaskContext};
use refine_agents::persistence::InMemoryPersistence;
use refine_agents::rig_adapter::check_endpoint;
use refine_agents::{Engine, EngineConfig, RunStatus};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (environment variables still take precedence)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluation strategy: rule_based, llm_graded, multi_expert or adversarial
    #[arg(long, global = true)]
    strategy: Option<StrategyKind>,

    /// Quality threshold in [0, 1]
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Iteration budget per run
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate, evaluate and revise until the threshold or the budget is reached
    Run {
        /// Initial generation prompt
        #[arg(long, conflicts_with = "prompt_file")]
        prompt: Option<String>,

        /// Read the initial prompt from a file
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        #[arg(long, default_value = "task")]
        task_id: String,

        /// Task name used for relevance scoring (defaults to the prompt's first line)
        #[arg(long)]
        task_name: Option<String>,

        #[arg(long, default_value = "general")]
        task_type: String,

        /// Also print a meta-evaluation of the run's history
        #[arg(long, default_value_t = false)]
        meta: bool,
    },
    /// Audit a JSON array of evaluation results
    Analyze {
        history: PathBuf,

        /// Final content the history refers to
        #[arg(long)]
        content: Option<PathBuf>,

        #[arg(long, default_value = "task")]
        task_id: String,

        #[arg(long, default_value = "task")]
        task_name: String,

        #[arg(long, default_value = "general")]
        task_type: String,
    },
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(threshold) = args.threshold {
        config.evaluation.quality_threshold = threshold;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.evaluation.max_iterations = max_iterations;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(
        strategy = %config.strategy,
        model = %config.llm.model,
        endpoint = %config.llm.base_url,
        threshold = config.evaluation.quality_threshold,
        "Refinement engine starting"
    );

    match args.command {
        Command::Run {
            prompt,
            prompt_file,
            task_id,
            task_name,
            task_type,
            meta,
        } => {
            let prompt = match (prompt, prompt_file) {
                (Some(p), _) => p,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read prompt file {}", path.display()))?,
                (None, None) => anyhow::bail!("one of --prompt or --prompt-file is required"),
            };
            let task_name = task_name.unwrap_or_else(|| {
                prompt.lines().next().unwrap_or_default().trim().to_string()
            });
            let task = TaskContext::new(task_id, task_name, task_type);

            if !check_endpoint(&config.llm.base_url).await {
                warn!(endpoint = %config.llm.base_url, "Inference endpoint not reachable; generation will fail");
            }

            let engine = Engine::from_config(config, Arc::new(InMemoryPersistence::new()))?;
            let shutdown = engine.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; cancelling run");
                    shutdown.cancel();
                }
            });

            let run = engine.run(&prompt, &task).await;
            info!(status = %run.status_line(), "Run complete");
            println!("{}", serde_json::to_string_pretty(&run)?);

            if meta {
                let content = run.content.clone().unwrap_or_default();
                let report = engine.analyze_history(&run.history, &content, &task).await;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }

            if run.status == RunStatus::Failed {
                std::process::exit(1);
            }
        }
        Command::Analyze {
            history,
            content,
            task_id,
            task_name,
            task_type,
        } => {
            let raw = std::fs::read_to_string(&history)
                .with_context(|| format!("failed to read history file {}", history.display()))?;
            let history: Vec<EvaluationResult> =
                serde_json::from_str(&raw).context("history must be a JSON array of evaluation results")?;
            let content = match content {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read content file {}", path.display()))?,
                None => String::new(),
            };
            let task = TaskContext::new(task_id, task_name, task_type);

            let engine = Engine::from_config(config, Arc::new(InMemoryPersistence::new()))?;
            let report = engine.analyze_history(&history, &content, &task).await;
            info!(status = %report.status_line(), "Analysis complete");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
