//! Aggregate sync status broadcast to collaborators.
//!
//! Collaborators render from [`SyncStatus`] alone; they never reach into
//! store internals.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

/// Current aggregate engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub online: bool,
    pub pending: i64,
    pub syncing: bool,
}

impl SyncStatus {
    /// The state before connectivity has been observed.
    #[must_use]
    pub const fn offline() -> Self {
        Self {
            online: false,
            pending: 0,
            syncing: false,
        }
    }

    /// The single rendered state. Precedence when several conditions hold:
    /// offline over pending/syncing, syncing over pending, pending over
    /// clean.
    #[must_use]
    pub const fn banner(&self) -> Banner {
        if !self.online {
            Banner::Offline
        } else if self.syncing {
            Banner::Syncing
        } else if self.pending > 0 {
            Banner::Pending(self.pending)
        } else {
            Banner::Clean
        }
    }
}

/// What a status banner should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    Offline,
    Syncing,
    Pending(i64),
    Clean,
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("offline"),
            Self::Syncing => f.write_str("syncing"),
            Self::Pending(count) => write!(f, "{count} pending"),
            Self::Clean => f.write_str("up to date"),
        }
    }
}

/// Broadcasts status changes over a watch channel.
pub struct StatusPublisher {
    tx: watch::Sender<SyncStatus>,
}

impl StatusPublisher {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::offline());
        Self { tx }
    }

    /// Broadcast a status; unchanged values are not re-sent.
    pub fn publish(&self, status: SyncStatus) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// The most recently published status.
    #[must_use]
    pub fn current(&self) -> SyncStatus {
        *self.tx.borrow()
    }

    /// A receiver observing every status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn banner_precedence_offline_first() {
        let status = SyncStatus {
            online: false,
            pending: 3,
            syncing: true,
        };
        assert_eq!(status.banner(), Banner::Offline);
    }

    #[test]
    fn banner_precedence_syncing_over_pending() {
        let status = SyncStatus {
            online: true,
            pending: 3,
            syncing: true,
        };
        assert_eq!(status.banner(), Banner::Syncing);
    }

    #[test]
    fn banner_pending_then_clean() {
        let pending = SyncStatus {
            online: true,
            pending: 2,
            syncing: false,
        };
        assert_eq!(pending.banner(), Banner::Pending(2));

        let clean = SyncStatus {
            online: true,
            pending: 0,
            syncing: false,
        };
        assert_eq!(clean.banner(), Banner::Clean);
    }

    #[test]
    fn banner_renders_for_display() {
        assert_eq!(Banner::Offline.to_string(), "offline");
        assert_eq!(Banner::Pending(5).to_string(), "5 pending");
        assert_eq!(Banner::Clean.to_string(), "up to date");
    }

    #[test]
    fn publish_skips_unchanged_values() {
        let publisher = StatusPublisher::new();
        let mut rx = publisher.subscribe();
        rx.mark_unchanged();

        publisher.publish(SyncStatus::offline());
        assert!(!rx.has_changed().unwrap());

        publisher.publish(SyncStatus {
            online: true,
            pending: 1,
            syncing: false,
        });
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().pending, 1);
    }
}
