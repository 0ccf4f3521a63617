//! # Error Types
//!
//! Domain-specific error types for waitlist-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  waitlist-core errors (this file)                                      │
//! │  ├── CoreError        - Lifecycle and admission rule violations        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  waitlist-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  waitlist-engine errors                                                │
//! │  └── EngineError      - What the host application sees                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant here is recoverable: the caller surfaces it to the end user
//! and no data has been changed.

use thiserror::Error;

use crate::lifecycle::Transition;
use crate::types::EntryStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The entry's current status does not permit the attempted transition.
    ///
    /// ## When This Occurs
    /// - Calling an entry that is already called
    /// - Seating an entry that is still waiting
    /// - Any transition on a completed / no_show / withdrawn entry
    #[error("Entry {entry_id} is {from}, cannot {transition}")]
    InvalidTransition {
        entry_id: String,
        from: EntryStatus,
        transition: Transition,
    },

    /// Seat attempted with a verification code that does not match.
    #[error("Verification code does not match for entry {entry_id}")]
    InvalidCode { entry_id: String },

    /// The queue is not accepting joins.
    #[error("Queue {queue_id} is closed")]
    QueueClosed { queue_id: String },

    /// The queue already holds `capacity` waiting entries.
    ///
    /// ## User Workflow
    /// ```text
    /// Customer submits join form
    ///      │
    ///      ▼
    /// waiting = 40, capacity = 40
    ///      │
    ///      ▼
    /// QueueFull { capacity: 40 }
    ///      │
    ///      ▼
    /// Chat widget shows: "The waitlist is full right now"
    /// ```
    #[error("Queue {queue_id} is full ({capacity} waiting)")]
    QueueFull { queue_id: String, capacity: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, invalid phone number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::InvalidTransition {
            entry_id: "entry-1".to_string(),
            from: EntryStatus::Completed,
            transition: Transition::Call,
        };
        assert_eq!(err.to_string(), "Entry entry-1 is completed, cannot call");
    }

    #[test]
    fn test_queue_full_message() {
        let err = CoreError::QueueFull {
            queue_id: "q-1".to_string(),
            capacity: 40,
        };
        assert_eq!(err.to_string(), "Queue q-1 is full (40 waiting)");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
