//! fanlens command line interface
//!
//! Subcommands split into two groups: `fetch`, `batch` and `direct`
//! drive a profile source (real browser or mock, per `FANLENS_MOCK`),
//! while `show`, `list` and `delete` only touch the store.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use fanlens::browser::random_user_agent;
use fanlens::client::ApiClient;
use fanlens::config::{Config, Overrides};
use fanlens::source::{Harvester, MockSource, ProfileSource};
use fanlens::store::{create_store, ProfileStore};
use fanlens::{load_identities, run_batch, Result};

#[derive(Parser)]
#[command(name = "fanlens")]
#[command(version, about = "Creator-profile harvester driven by CDP network interception")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database backend, `sqlite` or `postgres`
    #[arg(long, global = true, env = "FANLENS_DB")]
    db: Option<String>,

    /// Sqlite database file
    #[arg(long, global = true, env = "FANLENS_SQLITE_PATH")]
    sqlite_path: Option<String>,

    /// Postgres connection string
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Run the browser with a visible window
    #[arg(long, global = true)]
    visible: bool,

    /// Serve canned profiles instead of driving a browser
    #[arg(long, global = true)]
    mock: bool,

    /// Milliseconds to wait between batch identities
    #[arg(long, global = true, default_value_t = 1000)]
    delay_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest one profile through the browser and store it
    Fetch {
        /// Profile identity (username) to harvest
        identity: String,
    },

    /// Harvest every identity listed in a file, one per line
    Batch {
        /// Path to the identity list
        #[arg(long)]
        file: PathBuf,
    },

    /// Fetch one profile over the site API with captured tokens
    Direct {
        /// Profile identity (username) to fetch
        identity: String,
    },

    /// Print the stored profile for an identity
    Show {
        /// Profile identity (username) to look up
        identity: String,
    },

    /// List stored profiles, newest first
    List,

    /// Remove the stored profile for an identity
    Delete {
        /// Profile identity (username) to remove
        identity: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanlens=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let delay = Duration::from_millis(cli.delay_ms);
    let config = Config::resolve(Overrides {
        db: cli.db,
        sqlite_path: cli.sqlite_path,
        database_url: cli.database_url,
        visible: cli.visible,
        mock: cli.mock,
    })?;

    let store = create_store(&config.store).await?;
    store.create_table().await?;

    let outcome = run_command(cli.command, &config, store.as_ref(), delay).await;
    store.close().await;
    outcome
}

async fn run_command(
    command: Commands,
    config: &Config,
    store: &dyn ProfileStore,
    delay: Duration,
) -> Result<()> {
    match command {
        Commands::Fetch { identity } => {
            let mut source = build_source(config);
            source.start().await?;
            let outcome = fetch_and_store(source.as_mut(), store, &identity).await;
            source.close().await?;
            outcome
        }
        Commands::Batch { file } => {
            let identities = load_identities(&file)?;
            if identities.is_empty() {
                println!("No identities found in {}", file.display());
                return Ok(());
            }

            let mut source = build_source(config);
            source.start().await?;
            let report = run_batch(source.as_mut(), store, &identities, delay).await;
            source.close().await?;

            println!(
                "Batch complete: {} harvested, {} already snapshotted today, {} failed ({:.0}% success)",
                report.succeeded,
                report.skipped,
                report.failed,
                report.success_rate()
            );
            Ok(())
        }
        Commands::Direct { identity } => {
            let mut source = build_source(config);
            source.start().await?;
            let outcome = direct_and_store(config, source.as_mut(), store, &identity).await;
            source.close().await?;
            outcome
        }
        Commands::Show { identity } => {
            match store.get(&identity).await? {
                Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
                None => println!("No stored profile for {identity}"),
            }
            Ok(())
        }
        Commands::List => {
            let profiles = store.get_all().await?;
            if profiles.is_empty() {
                println!("No stored profiles");
                return Ok(());
            }
            for profile in &profiles {
                println!(
                    "{:<24} {:<32} updated {}",
                    profile.username,
                    profile.record.name,
                    profile.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        Commands::Delete { identity } => {
            if store.delete(&identity).await? {
                println!("Deleted {identity}");
            } else {
                println!("No stored profile for {identity}");
            }
            Ok(())
        }
    }
}

fn build_source(config: &Config) -> Box<dyn ProfileSource> {
    if config.mock {
        tracing::info!("Mock source enabled, no browser will be launched");
        Box::new(MockSource::new())
    } else {
        Box::new(Harvester::new(config.harvest.clone()))
    }
}

async fn fetch_and_store(
    source: &mut dyn ProfileSource,
    store: &dyn ProfileStore,
    identity: &str,
) -> Result<()> {
    let record = source.get_profile_data(identity).await?;

    store.upsert_profile(&record.username, &record).await?;
    if !store.insert_snapshot(&record.username, &record).await? {
        tracing::info!(username = %record.username, "Snapshot already taken today");
    }

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn direct_and_store(
    config: &Config,
    source: &mut dyn ProfileSource,
    store: &dyn ProfileStore,
    identity: &str,
) -> Result<()> {
    let user_agent = config
        .harvest
        .user_agent
        .clone()
        .unwrap_or_else(random_user_agent);
    let client = ApiClient::new(&config.harvest.base_url, &user_agent);

    match client.fetch(identity, source).await? {
        Some(record) => {
            store.upsert_profile(&record.username, &record).await?;
            if !store.insert_snapshot(&record.username, &record).await? {
                tracing::info!(username = %record.username, "Snapshot already taken today");
            }
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        None => println!("No data returned for {identity}"),
    }
    Ok(())
}
