//! Message parsing
//!
//! Raw bytes from the mailbox are parsed just far enough to address the
//! relay: an envelope sender and a subject for the log. The bytes
//! themselves are forwarded untouched.

use mail_parser::MessageParser;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Message parse error: {0}")]
pub struct ParseError(String);

/// Pipeline-scoped view of one remote message.
///
/// Lives only while a single message is being relayed; never persisted.
#[derive(Debug, Clone)]
pub struct RelayMessage {
    /// Complete message as fetched; relayed verbatim.
    pub raw: Vec<u8>,
    pub subject: String,
    /// Address from the `From` header, reused as the relay's envelope
    /// sender so replies still reach the original author.
    pub from: String,
}

/// Parse one fetched message.
///
/// # Errors
///
/// Fails when the bytes are not parseable as a message or carry no
/// usable `From` address — without one there is no envelope sender to
/// relay with.
pub fn parse_message(raw: Vec<u8>) -> Result<RelayMessage, ParseError> {
    let parsed = MessageParser::default()
        .parse(&raw)
        .ok_or_else(|| ParseError("not an RFC 5322 message".to_string()))?;

    let from = parsed
        .from()
        .and_then(|address| address.as_list())
        .and_then(<[mail_parser::Addr]>::first)
        .and_then(|addr| addr.address())
        .ok_or_else(|| ParseError("no usable From address".to_string()))?
        .to_string();

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();

    Ok(RelayMessage { raw, subject, from })
}
