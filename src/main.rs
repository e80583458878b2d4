//! mailbox-mirror: replay a captured session and print the mirrored state
//!
//! Loads a JSON capture of server responses, drives a [`MailboxSession`]
//! through them and prints the resulting folder tree and tags. Useful for
//! checking how a recorded notification stream lands in the mirror.

use std::path::PathBuf;

use clap::Parser;
use mailbox_mirror::{MailboxSession, MirrorConfig, ReplayTransport};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mailbox-mirror", version, about)]
struct Args {
    /// JSON array of `{ "body": ..., "context": ... }` responses
    capture: PathBuf,
    /// Own account id (overrides MAILBOX_MIRROR_ACCOUNT_ID)
    #[arg(long)]
    account: Option<String>,
    /// No-op round trips to replay after the initial load
    #[arg(long, default_value_t = 0)]
    noops: usize,
    /// Run without a notification session
    #[arg(long)]
    no_session: bool,
}

/// Application entry point
///
/// # Environment Variables
///
/// See [`MirrorConfig::load_from_env`] for configuration options; `RUST_LOG`
/// controls log output on stderr.
///
/// # Example
///
/// ```no_run
/// RUST_LOG=mailbox_mirror=debug cargo run -- capture.json --noops 3
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = MirrorConfig::load_from_env()?;
    if args.account.is_some() {
        config.account_id = args.account;
    }
    config.no_session |= args.no_session;

    let transport = ReplayTransport::from_file(&args.capture)?;
    info!(replies = transport.remaining(), capture = %args.capture.display(), "capture loaded");
    let session = MailboxSession::new(config, transport);

    session.all_folders().await?;
    for _ in 0..args.noops {
        session.noop().await?;
    }

    for folder in session.all_folders().await? {
        println!(
            "{:<40} id={:<12} unread={:<5} count={}",
            folder.path(),
            folder.id,
            folder.unread,
            folder.count
        );
    }
    let orphans = session.snapshot().orphans();
    if !orphans.is_empty() {
        println!("orphans: {}", orphans.iter().map(|f| f.id.as_str()).collect::<Vec<_>>().join(", "));
    }
    for tag in session.tags().await? {
        println!("tag {:<20} id={:<8} unread={}", tag.name, tag.id, tag.unread);
    }
    println!("size: {} bytes", session.size().await?);
    match session.last_change().await? {
        Some(change) => println!("last change: {} at {}", change.id, change.since.to_rfc3339()),
        None => println!("last change: none"),
    }
    Ok(())
}
