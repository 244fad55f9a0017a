//! Outbound message sink
//!
//! Relayed messages are handed to a local SMTP server. A permanent
//! reply matching the configured policy pattern means the sink refused
//! the message on purpose; the pipeline drops such messages instead of
//! retrying them forever.

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    /// Refused by policy; terminal for the message.
    #[error("Rejected by sink: {0}")]
    Rejected(String),

    /// Anything else; the message stays on the remote server for a
    /// later run.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Delivers relayed messages to the outbound mail system.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver `raw` unchanged, enveloped from `from` to `to`.
    ///
    /// # Errors
    ///
    /// [`SinkError::Rejected`] when the sink refuses the message by
    /// policy, [`SinkError::Unavailable`] for every other failure.
    async fn send(&self, raw: &[u8], from: &str, to: &str) -> Result<(), SinkError>;
}

/// SMTP sink relaying raw messages to a local server.
pub struct SmtpSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    reject_pattern: String,
}

impl SmtpSink {
    /// Plain SMTP to `host:port`; the usual target is a loopback MTA.
    #[must_use]
    pub fn new(host: &str, port: u16, reject_pattern: impl Into<String>) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();
        Self {
            transport,
            reject_pattern: reject_pattern.into(),
        }
    }

    fn classify(&self, err: &lettre::transport::smtp::Error) -> SinkError {
        let detail = err.to_string();
        if err.is_permanent() && detail.contains(&self.reject_pattern) {
            SinkError::Rejected(detail)
        } else {
            SinkError::Unavailable(detail)
        }
    }
}

#[async_trait]
impl MessageSink for SmtpSink {
    async fn send(&self, raw: &[u8], from: &str, to: &str) -> Result<(), SinkError> {
        let from_addr = from
            .parse()
            .map_err(|e| SinkError::Unavailable(format!("Invalid sender {from}: {e}")))?;
        let to_addr = to
            .parse()
            .map_err(|e| SinkError::Unavailable(format!("Invalid recipient {to}: {e}")))?;
        let envelope = Envelope::new(Some(from_addr), vec![to_addr])
            .map_err(|e| SinkError::Unavailable(format!("Invalid envelope: {e}")))?;

        self.transport
            .send_raw(&envelope, raw)
            .await
            .map(drop)
            .map_err(|e| self.classify(&e))
    }
}
