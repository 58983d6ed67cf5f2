//! CLI and environment configuration for the lanchat client.

use clap::Parser;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 800;
pub const DEFAULT_ROSTER_INTERVAL_SECS: u64 = 3;

/// Terminal client for a lanchat web server.
///
/// Opens one conversation, keeps its timeline in sync, and sends lines
/// read from stdin. CLI arguments take precedence over environment
/// variables.
#[derive(Parser, Debug)]
#[command(name = "lanchat-client", version, about)]
pub struct Cli {
    /// Base URL of the lanchat web server
    #[arg(long, short = 's', env = "LANCHAT_SERVER", default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Room ID to open
    #[arg(long, conflicts_with = "peer")]
    pub room: Option<String>,

    /// Peer node ID to open a private chat with
    #[arg(long)]
    pub peer: Option<String>,

    /// Message poll interval in milliseconds
    #[arg(long, env = "LANCHAT_POLL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Roster refresh interval in seconds
    #[arg(long, env = "LANCHAT_ROSTER_SECS", default_value_t = DEFAULT_ROSTER_INTERVAL_SECS)]
    pub roster_interval_secs: u64,
}
