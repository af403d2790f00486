//! sreflow CLI - bootstrap and run an SRE pipeline
//!
//! Running `sreflow` with no arguments loads `.env`, creates the default
//! session, runs the project's pipeline with a single "run" message and
//! prints every result it yields.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use sreflow_core::bootstrap::Bootstrap;
use sreflow_core::config::{Config, ConfigManager, SessionSettings};
use sreflow_core::pipeline;
use sreflow_core::runner::Runner;
use sreflow_core::session::{InMemorySessionService, SessionService};

#[derive(Parser)]
#[command(name = "sreflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bootstrap a session and run an SRE pipeline", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Environment file to load instead of searching for .env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Pipeline definition (defaults to ./pipeline.toml, then the user config directory)
    #[arg(long)]
    pipeline: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let manager = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            ConfigManager::with_path(path)?
        }
        None => ConfigManager::new()?,
    };
    let mut config = manager.into_config();
    config.apply_env_overrides();
    Ok(config)
}

fn init_logging(verbose: bool, default_level: &str) {
    // RUST_LOG wins; --verbose raises the default
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,sreflow_core=debug")
        } else {
            EnvFilter::new(default_level)
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // .env goes first so it can feed SREFLOW_* overrides and RUST_LOG
    let mut bootstrap = Bootstrap::new(SessionSettings::default()).with_progress(true);
    let env_file = bootstrap.load_environment(cli.env_file.as_deref())?;

    let mut config = load_config(cli.config)?;
    if let Some(path) = cli.pipeline {
        config.pipeline.path = Some(path);
    }

    init_logging(cli.verbose, &config.general.log_level);
    if let Some(path) = env_file {
        tracing::debug!("Environment loaded from {}", path.display());
    }
    bootstrap.set_settings(config.session.clone());

    let project_dir = std::env::current_dir()?;
    let (pipeline_path, definition) = pipeline::locate(config.pipeline.path.as_deref(), &project_dir)?;
    println!(
        "{} {} ({})",
        style("Loaded pipeline from:").bold(),
        pipeline_path.display(),
        style(&definition.name).cyan()
    );
    let agent = definition.build();

    let session_service: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
    let app_name = config.session.app_name.clone();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    bootstrap.run(
        session_service,
        move |sessions| Runner::new(agent, app_name, sessions),
        &mut out,
    )?;

    Ok(())
}
