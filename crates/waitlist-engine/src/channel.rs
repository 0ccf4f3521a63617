//! # Notification Channels
//!
//! How a committed notification reaches the customer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  NotificationDispatcher ──send(entry_id, payload)──► NotificationChannel │
//! │                                                       │                 │
//! │                         ┌─────────────────────────────┼───────────┐     │
//! │                         ▼                             ▼           ▼     │
//! │                  LiveSessions                    NoOpChannel   (host's  │
//! │            entry_id → mpsc::Sender               (discard)     own impl)│
//! │                         │                                               │
//! │                         ▼                                               │
//! │           customer's chat widget connection                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A reconnecting customer registers again and replaces the old session, so
//! `renotify` reaches the new connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use waitlist_core::{EntryStatus, NotificationKind, QueueEntry};

/// Buffered messages per live session.
const SESSION_BUFFER: usize = 16;

// =============================================================================
// Payload
// =============================================================================

/// What the customer's device receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub entry_id: String,
    pub queue_id: String,
    pub kind: NotificationKind,
    pub status: EntryStatus,
    pub customer_name: String,
    pub party_size: i64,
    /// Shown to the host when seating.
    pub verification_code: String,
    pub called_at: Option<DateTime<Utc>>,
    /// 1 for the first call, incremented by every renotify.
    pub notification_count: i64,
    pub message: String,
}

impl NotificationPayload {
    pub fn for_entry(entry: &QueueEntry, kind: NotificationKind) -> Self {
        let message = match kind {
            NotificationKind::Called => format!(
                "{}, your table for {} is ready. Show code {} to the host.",
                entry.customer_name, entry.party_size, entry.verification_code
            ),
            NotificationKind::Renotified => format!(
                "Reminder: your table for {} is ready. Show code {} to the host.",
                entry.party_size, entry.verification_code
            ),
        };

        NotificationPayload {
            entry_id: entry.id.clone(),
            queue_id: entry.queue_id.clone(),
            kind,
            status: entry.status,
            customer_name: entry.customer_name.clone(),
            party_size: entry.party_size,
            verification_code: entry.verification_code.clone(),
            called_at: entry.called_at,
            notification_count: entry.notification_count,
            message,
        }
    }
}

// =============================================================================
// Channel Trait
// =============================================================================

/// Delivery failures. Recorded on the outbox row, never surfaced to the
/// operation that produced the notification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The customer has no live connection right now.
    #[error("No active connection for entry {entry_id}")]
    NoActiveConnection { entry_id: String },

    /// The connection went away while sending.
    #[error("Session closed for entry {entry_id}")]
    SessionClosed { entry_id: String },

    /// Any other transport failure.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A way of reaching customers.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, entry_id: &str, payload: &NotificationPayload) -> Result<(), ChannelError>;
}

// =============================================================================
// Live Sessions
// =============================================================================

/// In-process registry of customer connections, keyed by entry id.
#[derive(Debug, Default)]
pub struct LiveSessions {
    sessions: DashMap<String, mpsc::Sender<NotificationPayload>>,
}

impl LiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for `entry_id`, replacing any previous one.
    ///
    /// The returned receiver is the connection's end; dropping it closes the
    /// session.
    pub fn register(&self, entry_id: &str) -> mpsc::Receiver<NotificationPayload> {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        if self.sessions.insert(entry_id.to_string(), tx).is_some() {
            debug!(entry_id = %entry_id, "Replaced live session");
        } else {
            debug!(entry_id = %entry_id, "Registered live session");
        }
        rx
    }

    /// Removes the connection for `entry_id`, if any.
    pub fn unregister(&self, entry_id: &str) -> bool {
        self.sessions.remove(entry_id).is_some()
    }

    pub fn is_connected(&self, entry_id: &str) -> bool {
        self.sessions
            .get(entry_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl NotificationChannel for LiveSessions {
    async fn send(&self, entry_id: &str, payload: &NotificationPayload) -> Result<(), ChannelError> {
        // Clone out so the shard isn't held across anything
        let tx = self
            .sessions
            .get(entry_id)
            .map(|tx| tx.value().clone())
            .ok_or_else(|| ChannelError::NoActiveConnection {
                entry_id: entry_id.to_string(),
            })?;

        match tx.try_send(payload.clone()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Only drop the session we tried; a reconnect may have replaced it
                self.sessions
                    .remove_if(entry_id, |_, current| current.same_channel(&tx));
                Err(ChannelError::SessionClosed {
                    entry_id: entry_id.to_string(),
                })
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(ChannelError::Delivery(format!(
                "session buffer full for entry {}",
                entry_id
            ))),
        }
    }
}

// =============================================================================
// No-Op Channel
// =============================================================================

/// Accepts and discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpChannel;

#[async_trait]
impl NotificationChannel for NoOpChannel {
    async fn send(&self, entry_id: &str, payload: &NotificationPayload) -> Result<(), ChannelError> {
        debug!(entry_id = %entry_id, kind = ?payload.kind, "Discarding notification");
        Ok(())
    }
}
