//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Trackcast - real-time shipment notification broker.
#[derive(Parser)]
#[command(name = "trackcast")]
#[command(version)]
#[command(about = "Trackcast notification broker and diagnostic tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the trackcast broker
    Start(StartArgs),

    /// Connect as a peer, subscribe to shipment topics, and stream events to stdout
    Subscribe(SubscribeArgs),

    /// Push a shipment status change through the broker's notify ingress
    Notify(NotifyArgs),
}

// -----------------------------------------------------------------------------
// Start command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct StartArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/trackcast.toml")]
    pub config: PathBuf,
}

// -----------------------------------------------------------------------------
// Subscribe command (kcat-style peer client)
// -----------------------------------------------------------------------------

/// Broker connection arguments.
#[derive(Args, Clone)]
pub struct ConnectArgs {
    /// Broker hostname or IP
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Broker peer port
    #[arg(long, default_value_t = 9400)]
    pub port: u16,

    /// Identity to authenticate as
    #[arg(long)]
    pub identity: String,

    /// Role to claim
    #[arg(long, value_enum, default_value = "client")]
    pub role: RoleArg,

    /// Credential token for the handshake
    #[arg(long, default_value = "dev")]
    pub token: String,
}

/// Role claimed during the handshake.
#[derive(clap::ValueEnum, Clone, Copy, Default)]
pub enum RoleArg {
    Admin,
    Courier,
    #[default]
    Client,
}

/// Output format for subscribe command.
#[derive(clap::ValueEnum, Clone, Default)]
pub enum OutputFormat {
    /// JSON objects, one per line
    #[default]
    Json,
    /// Event payloads only (no envelope)
    Raw,
}

#[derive(Args)]
pub struct SubscribeArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Shipment topic to subscribe to (can be repeated)
    #[arg(short, long = "topic", required = true)]
    pub topic: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

// -----------------------------------------------------------------------------
// Notify command (admin ingress driver)
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct NotifyArgs {
    /// Admin endpoint hostname or IP
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Admin endpoint port
    #[arg(long, default_value_t = 9401)]
    pub port: u16,

    /// Shipment topic to publish to
    #[arg(short, long)]
    pub topic: String,

    /// New shipment status
    #[arg(short, long)]
    pub status: String,

    /// Optional free-form details
    #[arg(short, long)]
    pub details: Option<String>,
}
