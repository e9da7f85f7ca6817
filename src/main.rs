mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::memory::types::{MemoryKind, Visibility};

#[derive(Parser)]
#[command(name = "cognee", version, about = "Agent memory engine with hybrid recall and multi-agent coordination")]
struct Cli {
    /// Config file (default: ~/.cognee/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store one memory
    Store {
        content: String,
        #[arg(long, default_value = "fact")]
        kind: MemoryKind,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        visibility: Option<Visibility>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
        /// Arbitrary JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// Id of the memory this one replaces
        #[arg(long)]
        supersedes: Option<String>,
    },
    /// Chunk, embed and store a text file with a linked summary
    Ingest {
        file: PathBuf,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Hybrid vector + keyword search with re-ranking
    Search {
        query: String,
        /// Requesting agent; private memories of other agents stay hidden
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        kind: Option<MemoryKind>,
        #[arg(long)]
        category: Option<String>,
        /// Categories to boost (repeatable)
        #[arg(long)]
        prefer: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
        /// Ids and previews only
        #[arg(long)]
        summary: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show one memory with its relations and audit log
    Inspect {
        id: String,
        /// Requesting agent; another agent's private memory is not shown
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Soft-delete a memory, or remove it entirely with --hard
    Forget {
        id: String,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        hard: bool,
    },
    /// Link two memories
    Relate {
        source: String,
        relation: String,
        target: String,
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
    },
    /// Walk the relation graph around a memory
    Graph {
        id: String,
        /// Requesting agent; private memories of other agents are skipped
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, default_value_t = 2)]
        depth: usize,
        #[arg(long)]
        relation: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show store statistics
    Stats {
        /// Limit to one agent's memories plus shared ones
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Lifecycle maintenance
    Maintain {
        #[command(subcommand)]
        action: MaintainAction,
    },
    /// Count tokens in a file or string
    Tokens {
        file: Option<PathBuf>,
        #[arg(long)]
        text: Option<String>,
        /// Input is a JSON array of chat messages
        #[arg(long)]
        messages: bool,
        /// Also truncate to this many tokens
        #[arg(long)]
        budget: Option<usize>,
    },
    /// Extractive summary of one or more files
    Summarize {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        budget: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Assign tasks from a JSON workflow ({agents, tasks}) and print execution waves
    Plan {
        file: PathBuf,
        /// Complete each round's tasks and keep assigning until done
        #[arg(long)]
        simulate: bool,
        #[arg(long)]
        json: bool,
    },
    /// Tally the votes in a JSON ballot and print the outcome
    Decide {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Database health report
    Doctor,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum MaintainAction {
    /// Multiply confidences by their decay factor
    Decay,
    /// Summarize old events per agent and week
    Compact,
    /// Remove stale low-confidence memories
    Cleanup {
        #[arg(long)]
        dry_run: bool,
    },
    /// Decay, compact, then clean up
    All {
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to the configured cache directory
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => CogneeConfig::load_from(path)?,
        None => CogneeConfig::load()?,
    };

    // RUST_LOG wins over the configured level. Logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Store {
            content,
            kind,
            agent,
            visibility,
            category,
            confidence,
            metadata,
            supersedes,
        } => cli::store::store(
            &config,
            cli::store::StoreArgs {
                content: &content,
                kind,
                agent: agent.as_deref(),
                visibility,
                category: category.as_deref(),
                confidence,
                metadata: metadata.as_deref(),
                supersedes: supersedes.as_deref(),
            },
        )?,
        Command::Ingest { file, agent, category } => {
            cli::ingest::ingest(&config, &file, agent.as_deref(), category.as_deref()).await?
        }
        Command::Search {
            query,
            agent,
            kind,
            category,
            prefer,
            limit,
            summary,
            json,
        } => {
            cli::search::search(
                &config,
                cli::search::SearchArgs {
                    query: &query,
                    agent: agent.as_deref(),
                    kind,
                    category: category.as_deref(),
                    prefer: &prefer,
                    limit,
                    summary,
                    json,
                },
            )
            .await?
        }
        Command::Inspect { id, agent, json } => {
            cli::inspect::inspect(&config, &id, agent.as_deref(), json)?
        }
        Command::Forget { id, reason, hard } => {
            cli::store::forget(&config, &id, reason.as_deref(), hard)?
        }
        Command::Relate {
            source,
            relation,
            target,
            weight,
        } => cli::store::relate(&config, &source, &relation, &target, weight)?,
        Command::Graph {
            id,
            agent,
            depth,
            relation,
            json,
        } => cli::inspect::graph(
            &config,
            &id,
            agent.as_deref(),
            depth,
            relation.as_deref(),
            json,
        )?,
        Command::Stats { agent, json } => cli::stats::stats(&config, agent.as_deref(), json)?,
        Command::Maintain { action } => match action {
            MaintainAction::Decay => cli::maintenance::decay(&config)?,
            MaintainAction::Compact => cli::maintenance::compact(&config)?,
            MaintainAction::Cleanup { dry_run } => cli::maintenance::cleanup(&config, dry_run)?,
            MaintainAction::All { dry_run } => cli::maintenance::all(&config, dry_run)?,
        },
        Command::Tokens {
            file,
            text,
            messages,
            budget,
        } => cli::text::tokens(&config, file.as_deref(), text.as_deref(), messages, budget)?,
        Command::Summarize { files, budget, json } => {
            cli::text::summarize(&config, &files, budget, json)?
        }
        Command::Plan { file, simulate, json } => {
            cli::coordination::plan(&config, &file, simulate, json)?
        }
        Command::Decide { file, json } => cli::coordination::decide(&config, &file, json)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
    }

    Ok(())
}
