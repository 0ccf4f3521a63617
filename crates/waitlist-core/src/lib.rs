//! # waitlist-core: Pure Business Logic for the Restaurant Waitlist
//!
//! This crate holds the queue entry lifecycle as pure functions with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Waitlist Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Chat widget / Host dashboard (outside this repo)     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 waitlist-engine (LifecycleTracker)              │   │
//! │  │     per-queue locks, busy retry, notification dispatcher        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ waitlist-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ lifecycle │  │ position  │  │ validation│  │   │
//! │  │   │   Queue   │  │  admit    │  │ recompute │  │   rules   │  │   │
//! │  │   │ QueueEntry│  │  call/seat│  │  estimate │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  waitlist-db (Database Layer)                   │   │
//! │  │          SQLite queries, migrations, unit of work               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Queue, QueueEntry, EntryStatus, etc.)
//! - [`lifecycle`] - Status transitions and admission
//! - [`position`] - Dense position recompute and wait estimates
//! - [`code`] - Verification code generation and matching
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use waitlist_core::lifecycle::{admit, call};
//! use waitlist_core::{EntryStatus, NewCustomer, Queue};
//!
//! let now = Utc::now();
//! let queue = Queue {
//!     id: "queue-1".into(),
//!     merchant_id: "merchant-1".into(),
//!     name: "Main".into(),
//!     capacity: None,
//!     average_service_minutes: 10,
//!     is_open: true,
//!     created_at: now,
//!     updated_at: now,
//! };
//!
//! let mut entry = admit(
//!     &queue,
//!     0,
//!     NewCustomer::new("Ana", "5550102030", 2),
//!     "entry-1".into(),
//!     "ABC234".into(),
//!     now,
//! )
//! .unwrap();
//! assert_eq!(entry.position, Some(1));
//!
//! call(&mut entry, now).unwrap();
//! assert_eq!(entry.status, EntryStatus::Called);
//! assert_eq!(entry.position, None);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod code;
pub mod error;
pub mod lifecycle;
pub mod position;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, ValidationError};
pub use lifecycle::{Transition, TransitionOutcome};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest party a single entry may hold.
pub const MAX_PARTY_SIZE: i64 = 50;

pub const MAX_CUSTOMER_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_WITHDRAW_REASON_LEN: usize = 200;
pub const MAX_QUEUE_NAME_LEN: usize = 100;

/// Upper bound for a queue's average service time.
pub const MAX_AVERAGE_SERVICE_MINUTES: i64 = 240;

/// Upper bound for a queue's capacity when one is set.
pub const MAX_CAPACITY: i64 = 10_000;
