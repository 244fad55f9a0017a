//! Runtime settings and account configuration

use crate::error::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the connection to a remote mailbox is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TransportMode {
    /// Unencrypted TCP.
    #[serde(rename = "plain")]
    Plain,
    /// TLS from the first byte (POP3S).
    #[serde(rename = "implicit-tls")]
    ImplicitTls,
    /// Opportunistic in-protocol upgrade. Not supported; accounts
    /// configured with this mode are skipped without contacting the
    /// server.
    #[serde(rename = "starttls")]
    StartTls,
}

/// One remote mailbox plus its forwarding target and policy.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub transport: TransportMode,
    /// Minimum number of minutes between contact attempts. Zero means
    /// every run may contact the account.
    #[serde(default)]
    pub min_interval_minutes: u32,
    /// Recipient every relayed message is forwarded to.
    pub forward_to: String,
    /// Substring of an authentication-failure reply marking it as the
    /// server's own reconnect throttle rather than a bad credential.
    /// The triggering text is server-specific, so it is configured per
    /// account; unset means no reply gets the soft classification.
    #[serde(default)]
    pub soft_deny_pattern: Option<String>,
}

/// Load the ordered account list from a JSON array.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be read or is not a
/// valid account list.
pub fn load_accounts(path: &Path) -> Result<Vec<AccountConfig>> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&data)
        .map_err(|e| Error::Config(format!("Invalid account list {}: {e}", path.display())))
}

/// Process-level settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub accounts_path: PathBuf,
    pub state_dir: PathBuf,
    /// Wall-clock limit for the whole per-account pipeline.
    pub account_deadline: Duration,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Substring of a permanent SMTP reply marking a policy rejection.
    pub smtp_reject_pattern: String,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// Reads from `.env` if present. All variables are optional:
    /// - `RELAY_ACCOUNTS` (default: `accounts.json`)
    /// - `RELAY_STATE_DIR` (default: the system temp directory)
    /// - `RELAY_DEADLINE_SECS` (default: `45`)
    /// - `RELAY_SMTP_HOST` (default: `localhost`)
    /// - `RELAY_SMTP_PORT` (default: `25`)
    /// - `RELAY_SMTP_REJECT_PATTERN` (default: `Sender address rejected:`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let deadline_secs: u64 = env::var("RELAY_DEADLINE_SECS")
            .unwrap_or_else(|_| "45".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RELAY_DEADLINE_SECS: {e}")))?;

        Ok(Self {
            accounts_path: env::var("RELAY_ACCOUNTS")
                .map_or_else(|_| PathBuf::from("accounts.json"), PathBuf::from),
            state_dir: env::var("RELAY_STATE_DIR")
                .map_or_else(|_| env::temp_dir(), PathBuf::from),
            account_deadline: Duration::from_secs(deadline_secs),
            smtp_host: env::var("RELAY_SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: env::var("RELAY_SMTP_PORT")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("Invalid RELAY_SMTP_PORT: {e}")))?,
            smtp_reject_pattern: env::var("RELAY_SMTP_REJECT_PATTERN")
                .unwrap_or_else(|_| "Sender address rejected:".to_string()),
        })
    }
}
