//! Colloquy: multi-agent conversation training
//!
//! Subcommands:
//!
//! - `train`    -- Run training episodes and write a run directory
//! - `inspect`  -- Inspect a saved behavior library

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use colloquy::behavior::BehaviorLibrary;
use colloquy::config::{ColloquyConfig, Provider};
use colloquy::env::CollaborationTask;
use colloquy::persistence::JsonRunStore;
use colloquy::training::{Backends, Trainer};

/// Behaviors listed per role by `inspect`.
const INSPECT_RECENT: usize = 5;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Colloquy: multi-agent conversation training
#[derive(Parser)]
#[command(name = "colloquy", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use scripted offline backends instead of a live provider.
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run training episodes.
    Train {
        /// Number of episodes (overrides the config value).
        #[arg(long)]
        episodes: Option<usize>,
    },

    /// Inspect a saved behavior library.
    Inspect {
        /// Path to a learned_behaviors.json file.
        path: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str::<ColloquyConfig>(&text)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        }
        None => ColloquyConfig::default(),
    };

    if cli.mock {
        config.model.provider = Provider::Mock;
    }

    // Fill in the API key from the environment when not set in the config file.
    if config.model.api_key.is_empty() {
        let var = match config.model.provider {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Mock => None,
        };
        if let Some(key) = var.and_then(|v| std::env::var(v).ok()) {
            config.model.api_key = key;
        }
    }

    match cli.command {
        Commands::Train { episodes } => {
            let episodes = episodes.unwrap_or(config.run.num_episodes);
            cmd_train(config, episodes).await
        }
        Commands::Inspect { path } => cmd_inspect(&path),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_train(config: ColloquyConfig, episodes: usize) -> Result<()> {
    tracing::info!(episodes, provider = ?config.model.provider, "Starting training");

    let backends = Backends::from_config(&config)?;
    let store = JsonRunStore::create(&config.run.save_dir)?;
    let run_dir = store.run_dir().to_path_buf();
    let task = CollaborationTask::new(config.agents.len());

    let mut trainer = Trainer::new(config, task, store, backends)?;
    let summary = trainer.train(episodes).await?;

    println!("Run directory: {}", run_dir.display());
    println!("  Episodes:       {}", summary.episodes);
    println!("  Mean reward:    {:.2}", summary.mean_reward);
    println!("  Best reward:    {:.2}", summary.best_reward);
    println!("  Recent mean:    {:.2}", summary.recent_mean_reward);
    println!("  Aborted:        {}", summary.metrics.episodes_aborted);
    println!("  Tokens spent:   ~{}", summary.tokens_spent);
    println!(
        "  Cache hits:     {}/{}",
        summary.metrics.cache_hits,
        summary.metrics.cache_hits + summary.metrics.cache_misses
    );
    println!();
    println!("{}", trainer.library().summary());
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let library = BehaviorLibrary::load_from_file(path)?;

    println!("Behavior Library: {}", path.display());
    println!("  Total behaviors: {}", library.len());
    println!("  Update cycles: {}", library.update_cycle());
    println!();
    println!("{}", library.summary());
    println!();

    for (role, count) in library.count_by_role() {
        println!("Most recent behaviors for {role} ({count} total):");
        for behavior in library.behaviors_for_role(&role, None, INSPECT_RECENT) {
            println!("  - {behavior}");
        }
        println!();
    }

    let history = library.history();
    if !history.is_empty() {
        println!("History ({} entries):", history.len());
        for entry in history.iter().take(10) {
            println!(
                "  Cycle {} [{}/{}] at {}: {}",
                entry.update_cycle,
                entry.role,
                entry.category,
                entry.added_at.format("%Y-%m-%d %H:%M:%S UTC"),
                entry.text
            );
        }
        if history.len() > 10 {
            println!("  ... and {} more", history.len() - 10);
        }
    }

    Ok(())
}
