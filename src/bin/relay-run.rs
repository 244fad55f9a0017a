#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Periodic entry point: one relay run per invocation
//!
//! Meant to be fired from cron or a systemd timer. Overlap protection
//! and all failure handling live in the library; this binary only wires
//! the production implementations together and runs once.

use clap::Parser;
use mail_relay::{
    FsMarkerFlag, FsThrottleStore, Pop3Mailbox, ReconnectThrottle, RunLock, RunOrchestrator,
    Settings, SmtpSink, SystemClock, load_accounts,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay-run")]
#[command(about = "Drain remote POP3 mailboxes into the local SMTP sink")]
struct Args {
    /// Account list (JSON array); overrides RELAY_ACCOUNTS
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// Directory for the run marker and throttle stamps; overrides
    /// RELAY_STATE_DIR
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut settings = Settings::from_env()?;
    if let Some(accounts) = args.accounts {
        settings.accounts_path = accounts;
    }
    if let Some(state_dir) = args.state_dir {
        settings.state_dir = state_dir;
    }

    let accounts = load_accounts(&settings.accounts_path)?;

    let lock = RunLock::new(Arc::new(FsMarkerFlag::new(&settings.state_dir)));
    let throttle = ReconnectThrottle::new(
        Arc::new(FsThrottleStore::new(&settings.state_dir)),
        Arc::new(SystemClock),
    );
    let sink = SmtpSink::new(
        &settings.smtp_host,
        settings.smtp_port,
        settings.smtp_reject_pattern,
    );

    let orchestrator = RunOrchestrator::new(
        lock,
        throttle,
        Arc::new(Pop3Mailbox),
        Arc::new(sink),
        settings.account_deadline,
    );

    orchestrator.run(&accounts).await;

    Ok(())
}
