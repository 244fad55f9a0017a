//! Remote mailbox capability
//!
//! The pipeline talks to the remote mailbox through these traits. The
//! production implementation is [`crate::pop3::Pop3Mailbox`]; tests run
//! against in-memory fakes.

use crate::config::AccountConfig;
use async_trait::async_trait;
use thiserror::Error;

/// Position of a message within the current session (1-based, stable
/// until the session ends).
pub type MessageId = u32;

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Opens authenticated sessions against an account's remote mailbox.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Connect and authenticate, returning a live session.
    ///
    /// # Errors
    ///
    /// [`MailboxError::Connect`] when the transport cannot be
    /// established, [`MailboxError::Auth`] when the server refuses the
    /// credentials (the detail carries the server's reply verbatim).
    async fn connect(
        &self,
        account: &AccountConfig,
    ) -> Result<Box<dyn MailboxSession>, MailboxError>;
}

/// One authenticated mailbox session.
#[async_trait]
pub trait MailboxSession: Send {
    /// List the messages currently pending, in mailbox order.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Protocol`] when the listing fails.
    async fn list_pending(&mut self) -> Result<Vec<MessageId>, MailboxError>;

    /// Retrieve the raw RFC 5322 bytes of one message.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Protocol`] when the transfer fails.
    async fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>, MailboxError>;

    /// Delete one message from the remote mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Protocol`] when the server refuses.
    async fn delete(&mut self, id: MessageId) -> Result<(), MailboxError>;

    /// End the session cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Protocol`] when the farewell fails; by
    /// then all deletions have already been requested.
    async fn quit(&mut self) -> Result<(), MailboxError>;
}
