//! Per-account relay pipeline
//!
//! Drains one account: open the mailbox, walk the pending messages in
//! mailbox order, forward each to the account's configured recipient,
//! and delete what was forwarded. Messages are processed independently;
//! one corrupt message or refused delivery never aborts the rest of the
//! batch. The whole account is bounded by a single wall-clock deadline.

use crate::config::{AccountConfig, TransportMode};
use crate::mailbox::{Mailbox, MailboxError, MailboxSession, MessageId};
use crate::message::parse_message;
use crate::sink::{MessageSink, SinkError};
use std::time::Duration;
use tracing::{info, warn};

/// What happened to one account during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// All pending messages were visited; the count is how many were
    /// forwarded and deleted.
    Completed(usize),
    /// Transport, authentication, or listing failed; nothing was
    /// relayed and nothing retries until the next scheduled run.
    ConnectFailed(String),
    /// The server refused the login because we reconnected too soon.
    /// Expected and recoverable.
    SoftDeny(String),
    /// The account is configured for STARTTLS, which this relay does
    /// not speak. No connection is attempted.
    StartTlsUnsupported,
    /// The per-account deadline elapsed. Messages already deleted stay
    /// deleted; the rest are picked up by a later run.
    TimedOut,
}

enum MessageOutcome {
    /// Forwarded and deleted.
    Relayed,
    /// Deleted without forwarding (sink policy rejection).
    Dropped,
    /// Left on the server for the next run.
    Left,
}

/// Fetch-parse-relay pipeline for a single account.
pub struct RelayPipeline<'a> {
    mailbox: &'a dyn Mailbox,
    sink: &'a dyn MessageSink,
}

impl<'a> RelayPipeline<'a> {
    #[must_use]
    pub const fn new(mailbox: &'a dyn Mailbox, sink: &'a dyn MessageSink) -> Self {
        Self { mailbox, sink }
    }

    /// Run the pipeline for one account, bounded by `deadline`.
    ///
    /// The deadline covers the entire account, not individual network
    /// calls; exceeding it abandons only this account's remaining work.
    pub async fn run(&self, account: &AccountConfig, deadline: Duration) -> RunOutcome {
        if account.transport == TransportMode::StartTls {
            return RunOutcome::StartTlsUnsupported;
        }

        (tokio::time::timeout(deadline, self.drain(account)).await)
            .unwrap_or(RunOutcome::TimedOut)
    }

    async fn drain(&self, account: &AccountConfig) -> RunOutcome {
        let mut session = match self.mailbox.connect(account).await {
            Ok(session) => session,
            Err(MailboxError::Auth(detail)) => {
                return if is_soft_deny(account, &detail) {
                    RunOutcome::SoftDeny(detail)
                } else {
                    RunOutcome::ConnectFailed(detail)
                };
            }
            Err(e) => return RunOutcome::ConnectFailed(e.to_string()),
        };

        let pending = match session.list_pending().await {
            Ok(pending) => pending,
            Err(e) => return RunOutcome::ConnectFailed(e.to_string()),
        };

        if pending.is_empty() {
            info!("No mail");
            session.quit().await.ok();
            return RunOutcome::Completed(0);
        }

        let mut relayed = 0;
        for id in pending {
            if matches!(
                self.relay_one(session.as_mut(), account, id).await,
                MessageOutcome::Relayed
            ) {
                relayed += 1;
            }
        }

        session.quit().await.ok();
        RunOutcome::Completed(relayed)
    }

    async fn relay_one(
        &self,
        session: &mut dyn MailboxSession,
        account: &AccountConfig,
        id: MessageId,
    ) -> MessageOutcome {
        let raw = match session.fetch(id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to fetch message {}: {}", id, e);
                return MessageOutcome::Left;
            }
        };

        let message = match parse_message(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to parse message {}: {}", id, e);
                return MessageOutcome::Left;
            }
        };

        info!("{}", message.subject);

        match self
            .sink
            .send(&message.raw, &message.from, &account.forward_to)
            .await
        {
            Ok(()) => {
                if let Err(e) = session.delete(id).await {
                    warn!("Relayed message {} but could not delete it: {}", id, e);
                }
                MessageOutcome::Relayed
            }
            Err(SinkError::Rejected(detail)) => {
                info!("Deleting message {}, rejected by sink policy: {}", id, detail);
                if let Err(e) = session.delete(id).await {
                    warn!("Could not delete rejected message {}: {}", id, e);
                }
                MessageOutcome::Dropped
            }
            Err(SinkError::Unavailable(detail)) => {
                warn!(
                    "Failed to relay message {}, leaving it on the server: {}",
                    id, detail
                );
                MessageOutcome::Left
            }
        }
    }
}

fn is_soft_deny(account: &AccountConfig, detail: &str) -> bool {
    account
        .soft_deny_pattern
        .as_deref()
        .is_some_and(|pattern| detail.contains(pattern))
}
