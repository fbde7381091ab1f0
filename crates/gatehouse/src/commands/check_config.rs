//! Check-config command - validates configuration without serving.

use anyhow::{Context as _, Result};
use clap::Args;
use gatehouse_server::Server;

use super::{Context, Overrides, resolve_config};

/// Arguments for the check-config command.
#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

/// Run the check-config command.
pub async fn run(args: CheckConfigArgs, ctx: &Context) -> Result<()> {
    let config = resolve_config(ctx, &args.overrides)?;

    // Builds templates, route table and HTTP clients the same way `serve` does.
    Server::from_config(&config).context("Failed to build proxy")?;

    println!("Configuration OK");
    println!("  listen:     {}", config.http_address);
    for upstream in &config.upstreams {
        println!("  upstream:   {}", upstream);
    }
    println!(
        "  provider:   {} (client id {})",
        config.provider.name.as_deref().unwrap_or("Google"),
        config.provider.client_id
    );
    println!(
        "  cookie:     {} (encrypted: {})",
        config.cookie.name, config.encrypt_cookie
    );
    match &config.delegated_auth_url {
        Some(url) => println!("  basic auth: {}", url),
        None => println!("  basic auth: disabled"),
    }
    if ctx.verbose {
        for pattern in &config.skip_auth_regex {
            println!("  skip auth:  {}", pattern);
        }
    }
    Ok(())
}
