//! Per-account reconnect throttle
//!
//! Remote mail servers commonly refuse logins that arrive too soon after
//! the previous one, so each account carries a minimum contact interval.
//! The stamp is persisted before a connection is allowed: a crash
//! mid-pipeline still spends the window instead of letting the next run
//! hammer a rate-limited server.

use crate::clock::Clock;
use crate::error::Result;
use crate::state::ThrottleStore;
use std::sync::Arc;

/// Deterministic, filename-safe identifier for one account identity.
///
/// Derived from host and username only, so it is independent of account
/// ordering and stable across runs.
#[must_use]
pub fn throttle_key(host: &str, username: &str) -> String {
    format!("{host}_{username}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '@' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Decides whether an account may be contacted again.
pub struct ReconnectThrottle {
    store: Arc<dyn ThrottleStore>,
    clock: Arc<dyn Clock>,
}

impl ReconnectThrottle {
    #[must_use]
    pub fn new(store: Arc<dyn ThrottleStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns `true` when the account may be contacted now.
    ///
    /// First contact always passes and writes a stamp. Later contacts
    /// pass only when strictly more than `min_interval_minutes` have
    /// elapsed; exactly at the boundary still denies. The stamp is only
    /// rewritten on a pass, so denied attempts do not push the window
    /// further out.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying store cannot be read or
    /// written.
    pub fn decide(&self, host: &str, username: &str, min_interval_minutes: u32) -> Result<bool> {
        let key = throttle_key(host, username);
        let now = self.clock.now().timestamp();

        let Some(last) = self.store.last_attempt(&key)? else {
            self.store.record_attempt(&key, now)?;
            return Ok(true);
        };

        if now - last > i64::from(min_interval_minutes) * 60 {
            self.store.record_attempt(&key, now)?;
            return Ok(true);
        }

        Ok(false)
    }
}
