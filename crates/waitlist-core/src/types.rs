//! # Domain Types
//!
//! Core domain types used throughout the waitlist.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌──────────────────┐  │
//! │  │     Queue       │   │     QueueEntry      │   │   EntryStatus    │  │
//! │  │  ─────────────  │   │  ─────────────────  │   │  ──────────────  │  │
//! │  │  id (UUID)      │◄──│  queue_id (FK)      │   │  Waiting   ┐     │  │
//! │  │  merchant_id    │   │  status             │   │  Called    ┘ act │  │
//! │  │  capacity       │   │  position (1..N)    │   │  Completed ┐     │  │
//! │  │  avg_service    │   │  verification_code  │   │  NoShow    │ term│  │
//! │  │  is_open        │   │  joined_at          │   │  Withdrawn ┘     │  │
//! │  └─────────────────┘   └─────────────────────┘   └──────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────────────┐   ┌─────────────────────────────────────┐ │
//! │  │ NotificationOutboxEntry │   │ Read models: EntryView, QueueStats  │ │
//! │  └─────────────────────────┘   └─────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Position Is Derived
//! `position` and `estimated_wait_minutes` are only meaningful while an entry
//! is `Waiting`. They are recomputed from the `joined_at`-ordered waiting set
//! on every mutating event (see [`crate::position`]) and cleared once the
//! entry leaves the waiting set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Entry Status
// =============================================================================

/// The lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// In line, holds a position.
    Waiting,
    /// Merchant called the customer; waiting for them to show up.
    Called,
    /// Customer was seated.
    Completed,
    /// Customer did not respond after being called.
    NoShow,
    /// Customer or merchant cancelled.
    Withdrawn,
}

impl EntryStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [EntryStatus; 5] = [
        EntryStatus::Waiting,
        EntryStatus::Called,
        EntryStatus::Completed,
        EntryStatus::NoShow,
        EntryStatus::Withdrawn,
    ];

    /// `Waiting` and `Called` are the two active states.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, EntryStatus::Waiting | EntryStatus::Called)
    }

    /// Terminal statuses never change again.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Storage / wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Waiting => "waiting",
            EntryStatus::Called => "called",
            EntryStatus::Completed => "completed",
            EntryStatus::NoShow => "no_show",
            EntryStatus::Withdrawn => "withdrawn",
        }
    }
}

impl Default for EntryStatus {
    fn default() -> Self {
        EntryStatus::Waiting
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        EntryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == needle)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown status '{}'", s),
            })
    }
}

// =============================================================================
// Queue
// =============================================================================

/// A named service line belonging to a merchant.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Queue {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Merchant that owns this queue.
    pub merchant_id: String,

    /// Display name ("Main Dining", "Patio").
    pub name: String,

    /// Maximum number of waiting entries. `None` = unlimited.
    pub capacity: Option<i64>,

    /// Average minutes to serve one party; drives estimated waits.
    pub average_service_minutes: i64,

    /// Whether the queue accepts new joins.
    pub is_open: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Queue {
    /// Checks whether another entry fits next to `waiting` existing ones.
    pub fn has_room(&self, waiting: i64) -> bool {
        match self.capacity {
            Some(capacity) => waiting < capacity,
            None => true,
        }
    }
}

// =============================================================================
// Queue Entry
// =============================================================================

/// One customer's attempt to join and progress through a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct QueueEntry {
    pub id: String,
    pub queue_id: String,
    pub merchant_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    /// Number of guests (1..=50).
    pub party_size: i64,
    pub notes: Option<String>,
    pub status: EntryStatus,
    /// 1-based rank among waiting entries. `None` once the entry left the waiting set.
    pub position: Option<i64>,
    #[ts(as = "String")]
    pub joined_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub called_at: Option<DateTime<Utc>>,
    /// Set when the entry reaches a terminal status.
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    /// `position × average_service_minutes`, display cache only.
    pub estimated_wait_minutes: Option<i64>,
    /// Short code issued at join, checked when seating.
    pub verification_code: String,
    pub notification_count: i64,
    #[ts(as = "Option<String>")]
    pub last_notified: Option<DateTime<Utc>>,
    pub withdraw_reason: Option<String>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Builds the customer-facing view of this entry.
    pub fn view(&self) -> EntryView {
        EntryView {
            entry_id: self.id.clone(),
            queue_id: self.queue_id.clone(),
            status: self.status,
            position: self.position,
            estimated_wait_minutes: self.estimated_wait_minutes,
            verification_code: self.verification_code.clone(),
            called_at: self.called_at,
            notification_count: self.notification_count,
        }
    }
}

/// The join form a customer submits.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub party_size: i64,
    pub notes: Option<String>,
}

impl NewCustomer {
    /// Convenience constructor without notes.
    pub fn new(name: impl Into<String>, phone: impl Into<String>, party_size: i64) -> Self {
        NewCustomer {
            name: name.into(),
            phone: phone.into(),
            party_size,
            notes: None,
        }
    }
}

// =============================================================================
// Read Models
// =============================================================================

/// What the customer sees in the chat widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EntryView {
    pub entry_id: String,
    pub queue_id: String,
    pub status: EntryStatus,
    pub position: Option<i64>,
    pub estimated_wait_minutes: Option<i64>,
    pub verification_code: String,
    #[ts(as = "Option<String>")]
    pub called_at: Option<DateTime<Utc>>,
    pub notification_count: i64,
}

/// Per-queue analytics for the merchant dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueueStats {
    pub queue_id: String,
    pub waiting: i64,
    pub called: i64,
    pub completed: i64,
    pub no_show: i64,
    pub withdrawn: i64,
    /// Mean minutes between join and call, over entries that were called.
    pub average_wait_minutes: Option<f64>,
}

impl QueueStats {
    /// Adds `count` entries of `status` to the matching counter.
    pub fn record(&mut self, status: EntryStatus, count: i64) {
        match status {
            EntryStatus::Waiting => self.waiting += count,
            EntryStatus::Called => self.called += count,
            EntryStatus::Completed => self.completed += count,
            EntryStatus::NoShow => self.no_show += count,
            EntryStatus::Withdrawn => self.withdrawn += count,
        }
    }

    /// Entries still in an active state.
    pub fn active(&self) -> i64 {
        self.waiting + self.called
    }
}

// =============================================================================
// Notification Outbox
// =============================================================================

/// Why a notification is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// First notification when the merchant calls the customer.
    Called,
    /// Re-sent after the customer's connection dropped and came back.
    Renotified,
}

/// A pending customer notification, written in the same transaction as the
/// status change that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct NotificationOutboxEntry {
    pub id: String,
    pub entry_id: String,
    pub queue_id: String,
    pub kind: NotificationKind,
    /// The notification payload as JSON.
    pub payload: String,
    /// Number of delivery attempts.
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    /// Earliest time the dispatcher may retry.
    #[ts(as = "Option<String>")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,
    /// Set when the dispatcher gave up after too many attempts.
    #[ts(as = "Option<String>")]
    pub abandoned_at: Option<DateTime<Utc>>,
}

impl NotificationOutboxEntry {
    /// Whether the dispatcher may attempt delivery at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.delivered_at.is_none()
            && self.abandoned_at.is_none()
            && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_and_terminal_statuses() {
        assert!(EntryStatus::Waiting.is_active());
        assert!(EntryStatus::Called.is_active());
        assert!(EntryStatus::Completed.is_terminal());
        assert!(EntryStatus::NoShow.is_terminal());
        assert!(EntryStatus::Withdrawn.is_terminal());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("no_show".parse::<EntryStatus>().unwrap(), EntryStatus::NoShow);
        assert_eq!("Called".parse::<EntryStatus>().unwrap(), EntryStatus::Called);
        assert!("seated".parse::<EntryStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&EntryStatus::NoShow).unwrap();
        assert_eq!(json, "\"no_show\"");
    }

    #[test]
    fn test_queue_has_room() {
        let now = Utc::now();
        let mut queue = Queue {
            id: "q".to_string(),
            merchant_id: "m".to_string(),
            name: "Main".to_string(),
            capacity: Some(2),
            average_service_minutes: 10,
            is_open: true,
            created_at: now,
            updated_at: now,
        };
        assert!(queue.has_room(1));
        assert!(!queue.has_room(2));

        queue.capacity = None;
        assert!(queue.has_room(10_000));
    }

    #[test]
    fn test_stats_record() {
        let mut stats = QueueStats::default();
        stats.record(EntryStatus::Waiting, 3);
        stats.record(EntryStatus::Called, 1);
        stats.record(EntryStatus::NoShow, 2);
        assert_eq!(stats.active(), 4);
        assert_eq!(stats.no_show, 2);
    }
}
