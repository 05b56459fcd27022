//! Retention policy for produced artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default retention: seven days.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long an artifact stays retrievable after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Age after which an artifact expires.
    pub window: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window: DEFAULT_RETENTION,
        }
    }
}

impl RetentionPolicy {
    /// Creates a policy with the given window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// When an artifact created at `created_at` expires. `None` means never.
    #[must_use]
    pub fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let window = chrono::Duration::from_std(self.window).ok()?;
        created_at.checked_add_signed(window)
    }

    /// Returns true once `now` is past the expiry time.
    #[must_use]
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.expires_at(created_at).is_some_and(|at| now >= at)
    }

    /// Time left until expiry, zero if already expired, `None` if never.
    #[must_use]
    pub fn remaining(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
        let at = self.expires_at(created_at)?;
        Some((at - now).to_std().unwrap_or(Duration::ZERO))
    }
}
