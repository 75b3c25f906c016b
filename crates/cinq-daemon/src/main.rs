//! Cinq offline queue daemon - queue messages offline, drain them online.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cinq_connectivity::NullRegistrar;
use cinq_service::{init_logging, Config, OfflineClient, Paths};
use cinq_store::{EventSink, MessageBody, QueueEvent};
use tracing::info;

/// Cinq daemon command-line interface.
#[derive(Parser)]
#[command(name = "cinq-daemon")]
#[command(about = "Cinq offline queue daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Base directory for runtime files (store, config). Defaults to ~/.cinq
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Access token for deliveries (or set CINQ_ACCESS_TOKEN)
    #[arg(long, global = true, env = "CINQ_ACCESS_TOKEN")]
    access_token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground until interrupted
    Start,
    /// Print the queue status snapshot
    Status,
    /// Queue a message for a contact (offline-safe)
    Send {
        /// Recipient contact id
        contact_id: String,
        /// Message text; omit with --ping
        message: Option<String>,
        /// Send a contentless ping instead of text
        #[arg(long)]
        ping: bool,
    },
    /// Run one drain pass over both queues
    Sync,
}

/// Mirrors queue events into the log stream.
struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: QueueEvent) {
        match event {
            QueueEvent::MessageQueued { id, contact_id } => {
                info!(id, contact_id = %contact_id, "Message queued");
            }
            QueueEvent::MessageSent { id, .. } => info!(id, "Message sent"),
            QueueEvent::MessageQuarantined { id, error } => {
                info!(id, error = %error, "Message quarantined");
            }
            QueueEvent::SyncComplete { sent, failed } => {
                info!(sent, failed, "Sync complete");
            }
            QueueEvent::ConnectivityChanged { online } => info!(online, "Connectivity"),
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let client = OfflineClient::init(
        &config,
        &paths.store_file(),
        Arc::new(LogSink),
        Arc::new(NullRegistrar),
    )
    .await?;

    if let Some(token) = cli.access_token {
        client.tokens().set_access_token(token);
    }

    match cli.command {
        Some(Commands::Start) | None => run_foreground(client).await,
        Some(Commands::Status) => print_status(client).await,
        Some(Commands::Send {
            contact_id,
            message,
            ping,
        }) => send_message(client, contact_id, message, ping).await,
        Some(Commands::Sync) => run_sync(client).await,
    }
}

/// Assume connectivity and wait for ctrl-c; queue drains happen through the
/// trigger loop.
async fn run_foreground(client: OfflineClient) -> anyhow::Result<()> {
    client.set_online(true);
    info!("Daemon running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");

    client.shutdown().await?;
    Ok(())
}

async fn print_status(client: OfflineClient) -> anyhow::Result<()> {
    let snapshot = client.status().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if let Some(badge) = cinq_status::badge_label(&snapshot) {
        println!("{badge}");
    }
    client.shutdown().await?;
    Ok(())
}

async fn send_message(
    client: OfflineClient,
    contact_id: String,
    message: Option<String>,
    ping: bool,
) -> anyhow::Result<()> {
    let body = match (message, ping) {
        (_, true) => MessageBody::Ping,
        (Some(text), false) => MessageBody::Text(text),
        (None, false) => anyhow::bail!("provide message text or --ping"),
    };

    let id = client.queue().queue_message(&contact_id, body).await?;
    println!("queued message {id}");
    client.shutdown().await?;
    Ok(())
}

async fn run_sync(client: OfflineClient) -> anyhow::Result<()> {
    client.set_online(true);
    let (messages, actions) = client.sync_now().await?;
    println!(
        "messages: {} sent, {} failed; actions: {} sent, {} failed",
        messages.sent, messages.failed, actions.sent, actions.failed
    );
    client.shutdown().await?;
    Ok(())
}
