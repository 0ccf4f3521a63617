//! # Engine Error Types
//!
//! What a host application sees from a lifecycle operation.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Caller error  │  │   Contention    │  │     Infrastructure      │ │
//! │  │  (show to user) │  │  (retry later)  │  │     (log + alert)       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidTrans.  │  │  Busy           │  │  PersistenceFailure     │ │
//! │  │  InvalidCode    │  │                 │  │  InvalidConfig          │ │
//! │  │  NotFound       │  │                 │  │  ConfigLoadFailed       │ │
//! │  │  QueueClosed    │  │                 │  │  Internal               │ │
//! │  │  QueueFull      │  │                 │  │                         │ │
//! │  │  Validation     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Notification delivery failures are [`ChannelError`](crate::channel::ChannelError)s
//! and stay inside the dispatcher. A committed transition never reports one.

use thiserror::Error;
use waitlist_core::{CoreError, EntryStatus, Transition, ValidationError};
use waitlist_db::DbError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by [`LifecycleTracker`](crate::tracker::LifecycleTracker).
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// The entry's status does not allow the operation. Nothing changed.
    #[error("Entry {entry_id} is {from}, cannot {transition}")]
    InvalidTransition {
        entry_id: String,
        from: EntryStatus,
        transition: Transition,
    },

    /// Seat attempted with the wrong verification code. Nothing changed.
    #[error("Verification code does not match for entry {entry_id}")]
    InvalidCode { entry_id: String },

    /// Queue or entry does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The queue is not accepting joins.
    #[error("Queue {queue_id} is closed")]
    QueueClosed { queue_id: String },

    /// The queue has no room left.
    #[error("Queue {queue_id} is full ({capacity} waiting)")]
    QueueFull { queue_id: String, capacity: i64 },

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Contention
    // =========================================================================
    /// The queue stayed locked past the retry budget. Safe to retry.
    #[error("Busy: {0}")]
    Busy(String),

    // =========================================================================
    // Infrastructure
    // =========================================================================
    /// The store failed to read or commit. The unit of work was rolled back.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Invalid engine configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition {
                entry_id,
                from,
                transition,
            } => EngineError::InvalidTransition {
                entry_id,
                from,
                transition,
            },
            CoreError::InvalidCode { entry_id } => EngineError::InvalidCode { entry_id },
            CoreError::QueueClosed { queue_id } => EngineError::QueueClosed { queue_id },
            CoreError::QueueFull { queue_id, capacity } => {
                EngineError::QueueFull { queue_id, capacity }
            }
            CoreError::Validation(e) => EngineError::Validation(e),
        }
    }
}

/// ```text
/// DbError::NotFound             → EngineError::NotFound
/// DbError::Busy / PoolExhausted → EngineError::Busy
/// everything else               → EngineError::PersistenceFailure
/// ```
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            e if e.is_busy() => EngineError::Busy(e.to_string()),
            e => EngineError::PersistenceFailure(e.to_string()),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl EngineError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if the operation can be retried unchanged.
    ///
    /// Only contention qualifies. Everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Busy(_))
    }

    /// Returns true if the caller sent something the current state rejects.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidTransition { .. }
                | EngineError::InvalidCode { .. }
                | EngineError::NotFound { .. }
                | EngineError::QueueClosed { .. }
                | EngineError::QueueFull { .. }
                | EngineError::Validation(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(EngineError::Busy("queue q-1".into()).is_retryable());
        assert!(!EngineError::PersistenceFailure("disk".into()).is_retryable());
        assert!(!EngineError::InvalidCode {
            entry_id: "e".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_db_error_mapping() {
        let not_found: EngineError = DbError::not_found("Entry", "e-1").into();
        assert!(matches!(not_found, EngineError::NotFound { ref id, .. } if id == "e-1"));

        let busy: EngineError = DbError::Busy("database is locked".into()).into();
        assert!(busy.is_retryable());

        let other: EngineError = DbError::QueryFailed("syntax".into()).into();
        assert!(matches!(other, EngineError::PersistenceFailure(_)));
    }

    #[test]
    fn test_core_error_mapping_keeps_details() {
        let err: EngineError = CoreError::InvalidTransition {
            entry_id: "e-1".into(),
            from: EntryStatus::Completed,
            transition: Transition::Call,
        }
        .into();
        assert_eq!(err.to_string(), "Entry e-1 is completed, cannot call");
        assert!(err.is_caller_error());
    }
}
