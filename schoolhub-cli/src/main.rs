use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use schoolhub_core::core_sync::SyncStatus;
use schoolhub_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use schoolhub_core::{Config, Engine};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "schoolhub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Configuration file; SCHOOLHUB_* variables are used when absent
    #[arg(short, long)]
    config: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default configuration file
    InitConfig {
        #[arg(default_value = "~/.schoolhub/config.toml")]
        path: String,
    },
    /// Create the first director account of an empty school
    SeedDirector {
        /// Display name of the director
        name: String,
    },
    /// Sign in and print the session token
    Login { login: String, password: String },
    /// Print the snapshot visible to a session
    Snapshot { token: String },
    /// Push the local cache to the remote authority
    Push,
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => {
            let path = expand(path);
            Config::from_file(&path).with_context(|| format!("loading {}", path.display()))
        }
        None => Config::from_env().context("reading SCHOOLHUB_* environment"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(engine: &mut Engine, command: Command, config: &Config) -> Result<()> {
    match command {
        Command::InitConfig { .. } => Ok(()),
        Command::SeedDirector { name } => {
            let credentials = engine.seed_director(&name).await?;
            print_json(&credentials)
        }
        Command::Login { login, password } => {
            let response = engine.login(&login, &password).await?;
            print_json(&serde_json::json!({
                "token": response.session.token,
                "expires_at": response.session.expires_at,
                "person": response.person,
            }))
        }
        Command::Snapshot { token } => {
            let response = engine.state(&token).await?;
            print_json(&response.snapshot)
        }
        Command::Push => {
            if config.sync.remote_url.is_none() {
                bail!("No remote authority configured (set sync.remote_url)");
            }
            match engine.sync_now() {
                Some(ticket) => match ticket.wait().await {
                    SyncStatus::Failed(reason) => bail!("Push failed: {}", reason),
                    status => {
                        info!(?status, "Push finished");
                        Ok(())
                    }
                },
                None => bail!("Store could not be serialized"),
            }
        }
    }
}

async fn run(command: Command, config_path: Option<&str>) -> Result<()> {
    if let Command::InitConfig { path } = &command {
        let path = expand(path);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Config::default().save_to_file(&path)?;
        info!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = load_config(config_path)?;
    let mut engine = Engine::open(&config).await?;
    let report = engine.bootstrap_report();
    info!(
        loaded_local = report.loaded_local,
        pulled_remote = report.pulled_remote,
        "Store ready"
    );

    let outcome = execute(&mut engine, command, &config).await;
    engine.shutdown().await;
    outcome
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Parse log level
    let log_level = args.log_level.parse::<LogLevel>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        LogLevel::Info
    });

    // Initialize logging
    let config = LogConfig::new(log_level).json_format(args.json_logs);
    init_logging_with_config(config)?;

    info!("SchoolHub CLI started");

    match args.command {
        Some(command) => run(command, args.config.as_deref()).await?,
        None => {
            warn!("No command specified. Use --help for usage information.");
        }
    }

    info!("SchoolHub CLI finished");

    Ok(())
}
