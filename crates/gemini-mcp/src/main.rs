//! gemini-mcp: Model Context Protocol server for Google Gemini

mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use gemini_mcp_core::Config;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "gemini-mcp", author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "GEMINI_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP over stdin/stdout (default)
    Stdio,
    /// Serve HTTP, event streams and WebSocket
    Serve(ServeArgs),
    /// Print the tool catalog as JSON and exit
    Tools,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    port: Option<u16>,

    /// Require `Authorization: Bearer <token>` on every route but /health
    #[arg(long)]
    auth_token: Option<String>,
}

impl ServeArgs {
    /// Flags override file and environment
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(token) = &self.auth_token {
            config.server.auth_token = Some(token.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command.unwrap_or(Command::Stdio) {
        Command::Tools => {
            println!("{}", commands::tools()?);
            Ok(())
        }
        Command::Stdio => {
            let config = Config::load(cli.config.as_deref())?;
            debug!("Config: {:?}", config);
            commands::stdio(&config).await
        }
        Command::Serve(args) => {
            let mut config = Config::load(cli.config.as_deref())?;
            args.apply(&mut config);
            debug!("Config: {:?}", config);
            commands::serve(&config).await
        }
    }
}
