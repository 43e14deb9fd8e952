//! growthd: operator CLI for the growth engine.

use chrono::Utc;
use clap::{Parser, Subcommand};
use growth_engine::config::Config;
use growth_engine::config::catalog::WorkflowCatalog;
use growth_engine::config::secrets::ExposeSecret;
use growth_engine::db::Db;
use growth_engine::engine::{HookExecutor, Orchestrator, Scheduler, SchedulerConfig};
use growth_engine::feed::ActionFeed;
use growth_engine::model::growth::{GrowthMetrics, GrowthScore};
use growth_engine::score::StaticMetrics;
use growth_engine::store::ScoreStore;
use growth_engine::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "growthd", about = "Growth scoring and automation workflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the workflow scheduler
    Serve {
        /// Workflow catalog (TOML); defaults to WORKFLOWS_FILE or the built-in catalog
        #[arg(long)]
        workflows: Option<PathBuf>,
        /// Maximum concurrent workflow runs
        #[arg(long)]
        max_concurrent: Option<usize>,
    },
    /// Growth score operations
    Score {
        #[command(subcommand)]
        action: ScoreAction,
    },
    /// List workflows from the catalog
    Workflows {
        /// Workflow catalog (TOML)
        #[arg(long)]
        workflows: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ScoreAction {
    /// Compute a score from explicit metrics and store it
    Compute {
        /// Skill progress (0-100)
        #[arg(long)]
        skill: f64,
        /// Posts per week
        #[arg(long)]
        posting: f64,
        /// Network engagement (0-100)
        #[arg(long)]
        network: f64,
        /// Mentor feedback (0-10)
        #[arg(long)]
        mentor: f64,
    },
    /// Recompute from a JSON metrics snapshot (or the sample profile) and store it
    Refresh {
        /// JSON file with skillProgress, postingFrequency, networkEngagement, mentorFeedback
        #[arg(long)]
        metrics: Option<PathBuf>,
    },
    /// Show the stored score
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            workflows,
            max_concurrent,
        } => cmd_serve(workflows, max_concurrent).await,
        Command::Score { action } => {
            let config = Config::from_env()?;
            let _guard = telemetry(&config)?;
            let store = open_store(&config).await?;

            match action {
                ScoreAction::Compute {
                    skill,
                    posting,
                    network,
                    mentor,
                } => {
                    let metrics = GrowthMetrics {
                        skill_progress: skill,
                        posting_frequency: posting,
                        network_engagement: network,
                        mentor_feedback: mentor,
                    };
                    let score = store.refresh(&StaticMetrics(metrics)).await?;
                    print_score(&score)
                }
                ScoreAction::Refresh { metrics } => {
                    let source = match metrics {
                        Some(path) => {
                            let raw = std::fs::read_to_string(&path)?;
                            StaticMetrics(GrowthMetrics::from_json_str(&raw)?)
                        }
                        None => StaticMetrics::sample(),
                    };
                    let score = store.refresh(&source).await?;
                    print_score(&score)
                }
                ScoreAction::Show => match store.load().await? {
                    Some(score) => print_score(&score),
                    None => {
                        println!("No score stored.");
                        Ok(())
                    }
                },
            }
        }
        Command::Workflows { workflows } => cmd_workflows(workflows),
    }
}

async fn open_store(config: &Config) -> anyhow::Result<ScoreStore> {
    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    Ok(ScoreStore::new(db))
}

fn telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "growthd".to_string(),
        log_level: config.log_level.clone(),
    })?)
}

async fn cmd_serve(workflows: Option<PathBuf>, max_concurrent: Option<usize>) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let _guard = telemetry(&config)?;
    let store = open_store(&config).await?;

    let path = workflows.or(config.workflows_file.clone());
    let catalog = WorkflowCatalog::load_or_builtin(path.as_deref())?;

    let feed = ActionFeed::new();
    let orchestrator = Arc::new(Orchestrator::new(&catalog, feed.clone()));

    let scheduler = Scheduler::new(
        orchestrator,
        Arc::new(HookExecutor),
        SchedulerConfig {
            tick_interval: config.tick_interval,
            max_concurrent: max_concurrent.unwrap_or(config.max_concurrent_runs).max(1),
        },
    );

    let mut events = feed.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!(
                    "[{}] #{} {:<8} {}: {}",
                    event.timestamp.format("%H:%M:%S"),
                    event.id,
                    event.status.to_string(),
                    event.title,
                    event.description
                ),
                Err(RecvError::Lagged(n)) => eprintln!("(skipped {n} events)"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Dashboard load: stored score, recomputed from the sample profile if absent.
    store.announce(&StaticMetrics::sample(), &feed).await?;

    let sched = scheduler.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        sched.shutdown();
    });

    scheduler.run().await?;
    Ok(())
}

fn cmd_workflows(workflows: Option<PathBuf>) -> anyhow::Result<()> {
    let path = workflows.or_else(|| std::env::var("WORKFLOWS_FILE").ok().map(PathBuf::from));
    let catalog = WorkflowCatalog::load_or_builtin(path.as_deref())?;
    let orchestrator = Orchestrator::new(&catalog, ActionFeed::new());
    let now = Utc::now();

    // Header
    println!(
        "{:<26}  {:<8}  {:<14}  {:>7}  RECOMMENDATION",
        "ID", "STATUS", "NEXT", "SUCCESS"
    );
    println!("{}", "-".repeat(100));

    for wf in orchestrator.list() {
        let flag = if orchestrator.needs_attention(&wf) { "!" } else { " " };
        println!(
            "{:<26}  {:<8}  {:<14}  {:>6.1}%{}  {}",
            wf.id.as_str(),
            wf.status.to_string(),
            wf.next_trigger_label(now),
            wf.success_rate,
            flag,
            wf.ai_recommendation.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

fn print_score(score: &GrowthScore) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(score)?);
    Ok(())
}
