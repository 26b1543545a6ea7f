//! CLI binary for nautilus.

use clap::{Parser, Subcommand};
use nautilus::notify::{LogNotifier, Notifier, TelegramNotifier};
use nautilus::research::{HttpResearchAgent, ResearchAgent, UnconfiguredResearchAgent};
use nautilus::site::ManifestSiteBuilder;
use nautilus::store::NewTask;
use nautilus::{Commands, DataRepo, DocumentStore, Heartbeat, NautilusConfig, ProjectPlan};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Nautilus: git-backed research backlog with a heartbeat scheduler.
#[derive(Parser)]
#[command(name = "nautilus", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the heartbeat until interrupted.
    Run {
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },

    /// Show project progress.
    Status,

    /// List queued tasks by section.
    Backlog,

    /// Queue a research task at the front of the backlog.
    Add {
        /// Task title.
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Section slug or title; unknown values create a new section.
        #[arg(short = 'k', long, default_value = "")]
        category: String,
    },

    /// Pause the heartbeat for the current project.
    Pause,

    /// Resume a paused project.
    Resume,

    /// Initialize the project from a TOML plan file (replaces the backlog).
    Init {
        plan: PathBuf,
    },

    /// Requeue tasks left in progress by an interrupted run.
    Recover,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nautilus=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let repo = DataRepo::open(&config.data_repo).await?;
    let store = DocumentStore::new(repo);
    let commands = Commands::new(
        store.clone(),
        config.project.clone(),
        config.heartbeat.interval_minutes,
    );

    let reply = match cli.command {
        Command::Run { once } => return run_heartbeat(&config, store, once).await,
        Command::Status => commands.status().await?,
        Command::Backlog => commands.backlog().await?,
        Command::Add {
            title,
            description,
            category,
        } => {
            commands
                .add(NewTask::new(title, description, category))
                .await?
        }
        Command::Pause => commands.pause().await?,
        Command::Resume => commands.resume().await?,
        Command::Init { plan } => {
            let raw = std::fs::read_to_string(&plan)?;
            commands.init(ProjectPlan::from_toml(&raw)?).await?
        }
        Command::Recover => commands.recover().await?,
    };
    println!("{reply}");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<NautilusConfig> {
    let mut config = match path {
        Some(path) => NautilusConfig::from_file(path)?,
        None => {
            let default_path = NautilusConfig::default_config_path();
            if default_path.exists() {
                NautilusConfig::from_file(&default_path)?
            } else {
                NautilusConfig::default()
            }
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn run_heartbeat(
    config: &NautilusConfig,
    store: DocumentStore,
    once: bool,
) -> anyhow::Result<()> {
    let research: Arc<dyn ResearchAgent> = match HttpResearchAgent::from_config(&config.research)? {
        Some(agent) => Arc::new(agent),
        None => {
            warn!("research.endpoint not set; every task will fail");
            Arc::new(UnconfiguredResearchAgent)
        }
    };
    let notifier: Arc<dyn Notifier> = match TelegramNotifier::from_config(&config.notify)? {
        Some(telegram) => Arc::new(telegram),
        None => Arc::new(LogNotifier),
    };
    let heartbeat = Arc::new(Heartbeat::new(
        store.clone(),
        research,
        notifier,
        Arc::new(ManifestSiteBuilder::new(store)),
        config.heartbeat.interval(),
    )
    .with_notify_timeout(config.notify.timeout()));

    if once {
        let outcome = heartbeat.tick().await?;
        println!("{outcome:?}");
        return Ok(());
    }
    if !config.heartbeat.enabled {
        info!("heartbeat disabled in config; nothing to run");
        return Ok(());
    }

    let handle = heartbeat.start(CancellationToken::new());
    tokio::signal::ctrl_c().await?;
    info!("interrupt received; waiting for the current cycle");
    handle.stop();
    handle.join().await;
    Ok(())
}
