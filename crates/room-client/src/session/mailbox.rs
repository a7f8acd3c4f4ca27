//! Session mailbox and depth monitoring.
//!
//! The mailbox is unbounded: channel callbacks run on the signaling
//! supervisor and must never block on a busy actor. Depth is tracked on
//! every send and receive so a stalled actor shows up in logs and in
//! `room_session_mailbox_depth`.
//!
//! | Depth | Level |
//! |-------|-------|
//! | <= 100 | Normal |
//! | 101-500 | Warning |
//! | > 500 | Critical |

use super::messages::SessionMessage;
use crate::errors::RoomError;
use crate::observability::metrics;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const MAILBOX_NORMAL: usize = 100;
pub const MAILBOX_WARNING: usize = 500;

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

/// Tracks queue depth of the session mailbox.
#[derive(Debug, Default)]
pub struct MailboxMonitor {
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(new_depth, Ordering::Relaxed);

        match Self::level_for_depth(new_depth) {
            MailboxLevel::Critical => {
                warn!(
                    target: "room.session.mailbox",
                    depth = new_depth,
                    threshold = MAILBOX_WARNING,
                    "Mailbox depth critical"
                );
            }
            // Log once when crossing into warning
            MailboxLevel::Warning if new_depth == MAILBOX_NORMAL + 1 => {
                debug!(
                    target: "room.session.mailbox",
                    depth = new_depth,
                    "Mailbox depth elevated"
                );
            }
            _ => {}
        }
    }

    /// Record a message being taken off the mailbox.
    pub fn record_dequeue(&self) {
        let previous = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| Some(d.saturating_sub(1)))
            .unwrap_or_default();
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        metrics::set_session_mailbox_depth(previous.saturating_sub(1));
    }

    /// Undo an enqueue whose send failed.
    fn record_rejected(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| Some(d.saturating_sub(1)));
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        Self::level_for_depth(self.current_depth())
    }

    fn level_for_depth(depth: usize) -> MailboxLevel {
        if depth > MAILBOX_WARNING {
            MailboxLevel::Critical
        } else if depth > MAILBOX_NORMAL {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Sending side of the session mailbox. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Mailbox {
    tx: mpsc::UnboundedSender<SessionMessage>,
    monitor: Arc<MailboxMonitor>,
}

impl Mailbox {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<SessionMessage>,
        monitor: Arc<MailboxMonitor>,
    ) -> Self {
        Self { tx, monitor }
    }

    /// Queue a message.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Internal` if the actor is gone.
    pub(crate) fn send(&self, message: SessionMessage) -> Result<(), RoomError> {
        self.monitor.record_enqueue();
        self.tx.send(message).map_err(|e| {
            self.monitor.record_rejected();
            RoomError::Internal(format!("channel send failed: {}", e.0.label()))
        })
    }

    /// A handle that does not keep the actor alive.
    pub(crate) fn downgrade(&self) -> WeakMailbox {
        WeakMailbox {
            tx: self.tx.downgrade(),
            monitor: Arc::clone(&self.monitor),
        }
    }
}

/// Mailbox reference held by callbacks owned by the actor itself.
#[derive(Clone)]
pub(crate) struct WeakMailbox {
    tx: mpsc::WeakUnboundedSender<SessionMessage>,
    monitor: Arc<MailboxMonitor>,
}

impl WeakMailbox {
    /// Queue a message if the actor still runs. Returns whether it was queued.
    pub(crate) fn send(&self, message: SessionMessage) -> bool {
        match self.tx.upgrade() {
            Some(tx) => Mailbox {
                tx,
                monitor: Arc::clone(&self.monitor),
            }
            .send(message)
            .is_ok(),
            None => false,
        }
    }
}
