#![deny(unsafe_code)]

//! keel CLI: query a container engine and follow its event feed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use keel_config::ClientConfig;
use keel_core::{Client, EventNotification, ListSelector, Query, build_info};

/// keel: a client for container engine HTTP APIs.
#[derive(Parser)]
#[command(name = "keel", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "keel.toml")]
    config: PathBuf,

    /// Engine endpoint, overriding config and DOCKER_HOST.
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine-wide information.
    Info,

    /// Show client and engine versions.
    Version,

    /// Check that the engine answers.
    Ping,

    /// List containers.
    Ps {
        /// Include stopped containers.
        #[arg(short, long)]
        all: bool,

        /// Filter as `name=value` (repeatable).
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },

    /// Follow the engine event feed until interrupted.
    Events {
        /// Filter as `name=value` (repeatable).
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,

        /// Only events at or after this unix timestamp.
        #[arg(long)]
        since: Option<i64>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config).await?;
    if let Some(host) = &cli.host {
        config.engine.host = Some(host.clone());
    }

    // Set up tracing subscriber with verbosity level
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => cmd_info(&config).await?,
        Commands::Version => cmd_version(&config).await?,
        Commands::Ping => cmd_ping(&config).await?,
        Commands::Ps { all, filters } => cmd_ps(&config, all, filters).await?,
        Commands::Events { filters, since } => cmd_events(&config, filters, since).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

async fn connect(config: &ClientConfig) -> Result<Client> {
    let client = Client::from_config(config).await?;
    info!(endpoint = %client.endpoint(), "using engine");
    Ok(client)
}

async fn cmd_info(config: &ClientConfig) -> Result<()> {
    let info = connect(config).await?.info().await?;
    print_json(info.as_ref())
}

async fn cmd_version(config: &ClientConfig) -> Result<()> {
    println!("keel {}", build_info::version_string());
    let version = connect(config).await?.version().await?;
    print_json(version.as_ref())
}

async fn cmd_ping(config: &ClientConfig) -> Result<()> {
    if connect(config).await?.ping().await? {
        println!("OK");
        Ok(())
    } else {
        bail!("engine did not answer ping")
    }
}

async fn cmd_ps(config: &ClientConfig, all: bool, filters: Vec<(String, String)>) -> Result<()> {
    let mut query = filter_query(filters);
    if all {
        query = query.param("all", true);
    }
    let selector = if query.is_empty() {
        ListSelector::All
    } else {
        ListSelector::Filters(query)
    };

    let containers = connect(config).await?.containers().list(selector).await?;
    print_json(containers.as_ref())
}

async fn cmd_events(
    config: &ClientConfig,
    filters: Vec<(String, String)>,
    since: Option<i64>,
) -> Result<()> {
    let mut query = filter_query(filters);
    if let Some(since) = since {
        query = query.param("since", since);
    }

    let client = connect(config).await?;
    let mut stream = client.events(Some(query));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing event feed");
                stream.abort();
                break;
            }
            notification = stream.recv() => match notification {
                Some(EventNotification::Connected) => info!("connected to event feed"),
                Some(EventNotification::Event(event)) => {
                    println!("{}", serde_json::to_string(event.as_json())?);
                }
                Some(EventNotification::Error(e)) => tracing::warn!(error = %e, "event feed error"),
                None => break,
            },
        }
    }

    Ok(())
}

fn cmd_config(config_path: &Path, config: &ClientConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render config")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<ClientConfig> {
    if path.exists() {
        ClientConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        Ok(ClientConfig::default())
    }
}

fn print_json(value: Option<&Value>) -> Result<()> {
    match value {
        Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
        None => println!("null"),
    }
    Ok(())
}

fn filter_query(filters: Vec<(String, String)>) -> Query {
    filters
        .into_iter()
        .fold(Query::new(), |query, (name, value)| query.filter(name, value))
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    if name.is_empty() {
        return Err(format!("missing filter name in '{s}'"));
    }
    Ok((name.to_string(), value.to_string()))
}
