pub mod config;
pub mod doctor;

use clap::{Parser, Subcommand};

/// relay-gateway — ingress and worker process for the generation pipeline.
#[derive(Debug, Parser)]
#[command(name = "relay-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the ingress server and the generation-job worker loop
    /// (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Loads configuration from the path named by `RELAY_CONFIG` (default
/// `config.toml`), falling back to defaults if the file doesn't exist,
/// then overlays the recognized environment variables (spec §6). Shared by
/// `serve`, `doctor`, and `config` so the loading logic lives in one place.
pub fn load_config() -> anyhow::Result<(relay_domain::config::Config, String)> {
    let config_path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let base = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        relay_domain::config::Config::default()
    };

    let config = base.apply_env(|key| std::env::var(key).ok());
    Ok((config, config_path))
}
