//! CLI command handlers.

pub mod check_config;
pub mod serve;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use gatehouse_config::{GatehouseConfig, ValidatedConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, if given.
    pub config: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Settings that override the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Address to listen on, e.g. 127.0.0.1:4180
    #[arg(long)]
    pub http_address: Option<String>,

    /// Upstream URL (can be specified multiple times; replaces the file's list)
    #[arg(long = "upstream")]
    pub upstreams: Vec<String>,

    /// OAuth client id
    #[arg(long)]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "GATEHOUSE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Secret used to sign session cookies
    #[arg(long, env = "GATEHOUSE_COOKIE_SECRET", hide_env_values = true)]
    pub cookie_secret: Option<String>,

    /// URL probed with Basic credentials to validate them
    #[arg(long)]
    pub delegated_auth_url: Option<String>,
}

impl Overrides {
    /// Layer these values on top of `config`.
    pub fn apply(&self, config: &mut GatehouseConfig) {
        if let Some(addr) = &self.http_address {
            config.http_address = addr.clone();
        }
        if !self.upstreams.is_empty() {
            config.upstreams = self.upstreams.clone();
        }
        if let Some(id) = &self.client_id {
            config.provider.client_id = id.clone();
        }
        if let Some(secret) = &self.client_secret {
            config.provider.client_secret = secret.clone();
        }
        if let Some(secret) = &self.cookie_secret {
            config.cookie.secret = secret.clone();
        }
        if let Some(url) = &self.delegated_auth_url {
            config.delegated_auth_url = Some(url.clone());
        }
    }
}

/// Load, override and validate configuration.
pub fn resolve_config(ctx: &Context, overrides: &Overrides) -> Result<ValidatedConfig> {
    let mut loaded = gatehouse_config::load_config(ctx.config.as_deref())
        .context("Failed to load configuration")?;

    match &loaded.source {
        Some(path) => tracing::info!(path = %path.display(), "Loaded config"),
        None => tracing::info!("No config file found, using defaults and CLI arguments"),
    }

    overrides.apply(&mut loaded.config);
    loaded
        .config
        .validate()
        .context("Invalid configuration")
}
