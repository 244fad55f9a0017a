//! Batch mail relay
//!
//! Drains configured remote POP3 mailboxes into a local SMTP sink:
//! every pending message is fetched, forwarded to the account's
//! configured recipient, and deleted from the remote mailbox once the
//! forward is confirmed. Designed to be invoked periodically (e.g. from
//! cron); a run marker keeps invocations from overlapping, and a
//! persistent per-account throttle keeps reconnect-sensitive servers
//! happy.

mod clock;
mod config;
mod error;
mod lock;
mod mailbox;
mod message;
mod pipeline;
mod pop3;
mod run;
mod sink;
mod state;
mod throttle;

pub use clock::{Clock, SystemClock};
pub use config::{AccountConfig, Settings, TransportMode, load_accounts};
pub use error::{Error, Result};
pub use lock::{LockError, RunGuard, RunLock};
pub use mailbox::{Mailbox, MailboxError, MailboxSession, MessageId};
pub use message::{ParseError, RelayMessage, parse_message};
pub use pipeline::{RelayPipeline, RunOutcome};
pub use pop3::Pop3Mailbox;
pub use run::RunOrchestrator;
pub use sink::{MessageSink, SinkError, SmtpSink};
pub use state::{FsMarkerFlag, FsThrottleStore, MarkerFlag, ThrottleStore};
pub use throttle::{ReconnectThrottle, throttle_key};
