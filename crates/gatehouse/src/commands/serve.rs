//! Serve command - runs the proxy in the foreground.

use anyhow::{Context as _, Result};
use clap::Args;
use gatehouse_server::Server;

use super::{Context, Overrides, resolve_config};

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = resolve_config(ctx, &args.overrides)?;

    if ctx.verbose {
        println!("Listening on {}", config.http_address);
        for upstream in &config.upstreams {
            println!("Upstream: {}", upstream);
        }
    }

    let server = Server::from_config(&config).context("Failed to build proxy")?;
    server.run().await.context("Server error")?;
    Ok(())
}
