use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use giteamirror::config::LoggingConfig;
use giteamirror::{Config, GiteaClient, GitHubClient, MirrorEngine, Scheduler, TargetApi};

#[derive(Parser)]
#[command(name = "giteamirror")]
#[command(about = "Mirror GitHub repositories into Gitea")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log intended changes without touching Gitea
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror repositories, repeating after the configured delay
    Run {
        /// Exit after a single run
        #[arg(long)]
        once: bool,
    },

    /// List repositories that would be mirrored
    List,

    /// Validate configuration and check access to GitHub and Gitea
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref()).context("Invalid configuration")?;
    if cli.dry_run {
        config.dry_run = true;
    }

    init_logging(cli.verbose, &config.logging)?;
    info!("Starting giteamirror v{}", env!("CARGO_PKG_VERSION"));
    info!(config = ?config.redacted(), "Loaded configuration");

    match cli.command.unwrap_or(Commands::Run { once: false }) {
        Commands::Run { once } => cmd_run(config, once).await,
        Commands::List => cmd_list(config).await,
        Commands::Check => cmd_check(&config).await,
    }
}

/// Initialize logging based on verbosity and configured format
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if logging.format == "json" {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    result.context("Failed to initialize logging")?;

    Ok(())
}

async fn cmd_run(config: Config, once: bool) -> Result<()> {
    let delay = config.delay()?;
    let single_run = once || config.sync.single_run;

    let engine = MirrorEngine::new(config).context("Failed to create mirror engine")?;
    let scheduler = Scheduler::new(engine, delay, single_run);

    let stats = scheduler.run_until_interrupted().await;
    info!("Completed {} runs ({} failed)", stats.runs, stats.failed_runs);

    if stats.interrupted {
        anyhow::bail!("Mirror run {} was interrupted", stats.runs);
    }

    // A single run reports its failure through the exit code
    if single_run && stats.failed_runs > 0 {
        anyhow::bail!("Mirror run failed");
    }

    Ok(())
}

async fn cmd_list(config: Config) -> Result<()> {
    let engine = MirrorEngine::new(config).context("Failed to create mirror engine")?;
    let repositories = engine.discover().await;

    println!("{} repositories would be mirrored:", repositories.len());
    for repo in &repositories {
        let mut tags = Vec::new();
        if repo.is_private {
            tags.push("private".to_string());
        }
        if repo.is_fork {
            tags.push("fork".to_string());
        }
        if repo.is_starred() {
            tags.push("starred".to_string());
        }
        if let Some(org) = repo.organization() {
            tags.push(format!("org:{}", org));
        }

        if tags.is_empty() {
            println!("  {}", repo.full_name);
        } else {
            println!("  {} [{}]", repo.full_name, tags.join(", "));
        }
    }

    Ok(())
}

async fn cmd_check(config: &Config) -> Result<()> {
    println!("Configuration: OK");

    let github = GitHubClient::new(&config.github)?;
    if config.github.token.is_some() {
        let login = github.authenticated_login().await?;
        println!("GitHub: authenticated as {}", login);
    } else {
        println!("GitHub: anonymous access for {}", github.username());
    }

    let gitea = GiteaClient::new(&config.gitea.url, &config.gitea.token)
        .context("Failed to create Gitea client")?;
    let user = gitea
        .current_user()
        .await
        .context("Failed to reach Gitea. Check your Gitea URL and token.")?;
    println!("Gitea: authenticated as {} at {}", user.name, gitea.base_url());

    Ok(())
}
