//! Unix timestamps for invoice creation, expiry and settlement.
//!
//! Invoices carry three points in time: when they were created, when they expire
//! (`created_at + expiry`), and when they were paid. All are whole seconds since
//! the Unix epoch and serialize as plain JSON integers.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// A Unix timestamp representing seconds since the Unix epoch (1970-01-01T00:00:00Z).
///
/// # Example
///
/// ```
/// use invoicer_types::timestamp::UnixTimestamp;
///
/// let created = UnixTimestamp::from_secs(1_700_000_000);
/// let expires = created.saturating_add(3600);
/// assert_eq!(expires.as_secs(), 1_700_003_600);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(u64);

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl UnixTimestamp {
    /// Creates a new [`UnixTimestamp`] from a raw seconds value.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current system time as a [`UnixTimestamp`].
    ///
    /// A clock set before the Unix epoch reads as the epoch itself.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self(now)
    }

    /// Returns the timestamp as raw seconds since the Unix epoch.
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Adds seconds, clamping at `u64::MAX` instead of wrapping.
    ///
    /// Expiry parameters are user supplied, so `created_at + expiry` must never wrap
    /// into the past.
    pub const fn saturating_add(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds from `self` until `later`, zero if `later` is not in the future.
    pub const fn secs_until(self, later: UnixTimestamp) -> u64 {
        later.0.saturating_sub(self.0)
    }
}
