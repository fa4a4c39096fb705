use std::env;

use anyhow::Context;
use clap::{Parser, Subcommand};
use garc_controller::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use garc_controller::{ControllerConfig, controller, observability};
use garc_core::Runner;
use kube::CustomResourceExt;

#[derive(Debug, Parser)]
#[command(name = "garc-controller", version, about = "Self-hosted GitHub Actions runner controller")]
struct Cli {
    /// Configuration file (default: garc.toml, or GARC_CONFIG)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Run the controller (default)
    Run,
    /// Print the Runner CustomResourceDefinition as YAML
    Crd,
}

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    CliArgument,
    EnvironmentVariable,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (GARC_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    if let Some(Command::Crd) = cli.command {
        match serde_yaml::to_string(&Runner::crd()) {
            Ok(yaml) => print!("{yaml}"),
            Err(e) => {
                eprintln!("Failed to render CRD: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    observability::init_tracing();

    let (config_path, source) = resolve_config_path(cli.config);
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );
    observability::apply_logging_level(&cfg.logging.level);

    if let Err(err) = run(cfg).await {
        eprintln!("Controller error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cfg: ControllerConfig) -> anyhow::Result<()> {
    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    controller::run(client, cfg)
        .await
        .context("controller failed")?;
    Ok(())
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: GARC_CONFIG
/// 3. Default: garc.toml
fn resolve_config_path(cli_path: Option<String>) -> (String, ConfigSource) {
    if let Some(path) = cli_path {
        return (path, ConfigSource::CliArgument);
    }

    if let Ok(path) = env::var("GARC_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}
