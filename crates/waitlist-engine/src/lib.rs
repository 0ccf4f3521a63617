//! # waitlist-engine: Queue Entry Lifecycle Tracker
//!
//! Serializes queue mutations, commits them atomically, and delivers the
//! customer notifications they produce.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Engine Architecture                             │
//! │                                                                         │
//! │  host transport (HTTP handler, chat widget, dashboard)                  │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      LifecycleTracker                            │  │
//! │  │                                                                  │  │
//! │  │  join / call / seat / mark_no_show / withdraw / renotify         │  │
//! │  │  queue admin, reads, administrative cleanup                      │  │
//! │  └───────┬──────────────────────┬───────────────────────┬───────────┘  │
//! │          ▼                      ▼                       ▼              │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌────────────────────┐    │
//! │  │  QueueLocks    │  │ waitlist-db        │  │ DispatcherHandle   │    │
//! │  │                │  │ QueueUnitOfWork    │  │                    │    │
//! │  │ one async      │  │ entry + positions  │  │ wake() after a     │    │
//! │  │ mutex / queue  │  │ + outbox, atomic   │  │ notifying commit   │    │
//! │  └────────────────┘  └─────────┬──────────┘  └─────────┬──────────┘    │
//! │                                │ notification_outbox   │               │
//! │                                ▼                       ▼               │
//! │                      ┌───────────────────────────────────────┐         │
//! │                      │        NotificationDispatcher         │         │
//! │                      │  poll / wake → send → delivered,      │         │
//! │                      │  failed (backoff) or abandoned        │         │
//! │                      └───────────────────┬───────────────────┘         │
//! │                                          ▼                             │
//! │                      NotificationChannel (LiveSessions, NoOpChannel)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`tracker`] - `LifecycleTracker`, the entry point for every operation
//! - [`lock`] - Per-queue async locks
//! - [`outbox`] - Notification dispatcher over the outbox table
//! - [`channel`] - Notification channel trait and live session registry
//! - [`config`] - Engine configuration (TOML + environment)
//! - [`error`] - Engine error types

pub mod channel;
pub mod config;
pub mod error;
pub mod lock;
pub mod outbox;
pub mod tracker;

// Re-exports for convenience
pub use channel::{ChannelError, LiveSessions, NoOpChannel, NotificationChannel, NotificationPayload};
pub use config::{DatabaseSettings, EngineConfig, LockingSettings, NotificationSettings};
pub use error::{EngineError, EngineResult};
pub use lock::{QueueGuard, QueueLocks};
pub use outbox::{DispatchReport, DispatcherHandle, NotificationDispatcher};
pub use tracker::LifecycleTracker;
