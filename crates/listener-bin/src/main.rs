//! Edge listener - streams chat message events from the edge as JSON lines.

mod app;
mod guidance;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// Edge listener command-line interface.
#[derive(Parser, Debug)]
#[command(name = "edge-listen")]
#[command(about = "Listen to the chat edge and print message events as JSON lines")]
#[command(version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error). Defaults to the config value
    #[arg(short, long, env = "EDGE_LISTENER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Base directory for config, credentials and logs. Defaults to ~/.edge-listener
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Cookie file to use instead of <base-dir>/appstate.json
    #[arg(long)]
    appstate: Option<PathBuf>,

    /// Also deliver messages sent by the logged-in account
    #[arg(long)]
    self_listen: bool,

    /// Stop on the first connection loss instead of reconnecting
    #[arg(long)]
    no_auto_reconnect: bool,

    /// Region hint for the edge endpoint (e.g. PRN, ATN)
    #[arg(long)]
    region: Option<String>,

    /// Full endpoint URL, overriding region selection
    #[arg(long)]
    endpoint: Option<String>,

    /// HTTP proxy URL for the WebSocket connection
    #[arg(long)]
    proxy: Option<String>,

    /// Sequence id to resume the event stream from
    #[arg(long)]
    resume_from: Option<i64>,

    /// Browser family for the user agent (chrome, firefox, safari, edge)
    #[arg(long)]
    browser: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    app::run(cli).await
}
