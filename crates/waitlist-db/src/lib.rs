//! # waitlist-db: Database Layer for the Waitlist
//!
//! SQLite storage for queues, entries and the notification outbox, using
//! sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Waitlist Data Flow                               │
//! │                                                                         │
//! │  LifecycleTracker::call(entry_id)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   waitlist-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ QueueRepo      │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ EntryRepo      │    │              │  │   │
//! │  │   │ WAL, FK, busy │    │ OutboxRepo     │    │              │  │   │
//! │  │   │ timeout       │    │ QueueUnitOfWork│    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │          <config dir>/waitlist.db (see EngineConfig)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repositories and the per-queue unit of work
//!
//! ## Usage
//!
//! ```rust,ignore
//! use waitlist_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/waitlist.db")).await?;
//!
//! // Lock-free reads
//! let waiting = db.entries().list_waiting(&queue_id).await?;
//!
//! // Atomic writes
//! let mut uow = db.begin_queue(&queue_id, Utc::now()).await?;
//! uow.insert_entry(&entry).await?;
//! uow.reassign_positions().await?;
//! uow.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::entry::EntryRepository;
pub use repository::notification::NotificationOutboxRepository;
pub use repository::queue::QueueRepository;
pub use repository::unit_of_work::QueueUnitOfWork;
