//! # Repository Module
//!
//! Database repository implementations for the waitlist.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reads vs. Writes                                     │
//! │                                                                         │
//! │  LifecycleTracker                                                      │
//! │       │                                                                 │
//! │       ├── reads ───► EntryRepository / QueueRepository                 │
//! │       │              (pool, no lock, latest committed state)            │
//! │       │                                                                 │
//! │       └── writes ──► QueueUnitOfWork                                   │
//! │                      (one transaction per queue mutation:               │
//! │                       entry + positions + outbox row)                   │
//! │                                                                         │
//! │  NotificationDispatcher                                                │
//! │       └────────────► NotificationOutboxRepository                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`QueueRepository`](queue::QueueRepository) - Queue creation and lookup
//! - [`EntryRepository`](entry::EntryRepository) - Entry reads, stats, cleanup
//! - [`NotificationOutboxRepository`](notification::NotificationOutboxRepository) - Outbox processing
//! - [`QueueUnitOfWork`](unit_of_work::QueueUnitOfWork) - Atomic per-queue mutations

/// Column list shared by every `queue_entries` SELECT.
macro_rules! entry_columns {
    () => {
        "id, queue_id, merchant_id, customer_name, customer_phone, party_size, notes, \
         status, position, joined_at, called_at, completed_at, estimated_wait_minutes, \
         verification_code, notification_count, last_notified, withdraw_reason, updated_at"
    };
}

/// Column list shared by every `queues` SELECT.
macro_rules! queue_columns {
    () => {
        "id, merchant_id, name, capacity, average_service_minutes, is_open, created_at, updated_at"
    };
}

pub mod entry;
pub mod notification;
pub mod queue;
pub mod unit_of_work;
