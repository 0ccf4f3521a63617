//! # Entry Lifecycle
//!
//! The queue entry state machine. Every function here is pure: it mutates an
//! in-memory [`QueueEntry`] and reports what the caller must do next
//! (recompute positions, enqueue a notification). Persisting the result is
//! the database layer's job.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   join ──► ┌─────────┐  call   ┌────────┐  seat(code)  ┌───────────┐   │
//! │            │ WAITING │ ──────► │ CALLED │ ───────────► │ COMPLETED │   │
//! │            └────┬────┘         └───┬─┬──┘              └───────────┘   │
//! │                 │                  │ │  mark_no_show   ┌───────────┐   │
//! │                 │                  │ └───────────────► │  NO_SHOW  │   │
//! │                 │ withdraw         │ withdraw          └───────────┘   │
//! │                 │                  ▼                   ┌───────────┐   │
//! │                 └────────────────────────────────────► │ WITHDRAWN │   │
//! │                                    ▲                   └───────────┘   │
//! │                          renotify  │ (CALLED → CALLED)                 │
//! │                                                                         │
//! │  Terminal statuses (COMPLETED, NO_SHOW, WITHDRAWN) accept nothing.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A rejected transition returns [`CoreError::InvalidTransition`] and the
//! entry is left exactly as it was.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::code::codes_match;
use crate::error::{CoreError, CoreResult};
use crate::position::{estimated_wait_minutes, next_position};
use crate::types::{EntryStatus, NewCustomer, NotificationKind, Queue, QueueEntry};
use crate::validation::{validate_new_customer, validate_withdraw_reason};

// =============================================================================
// Transitions
// =============================================================================

/// An operation that moves an entry through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Call,
    Seat,
    MarkNoShow,
    Withdraw,
    Renotify,
}

impl Transition {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Transition::Call => "call",
            Transition::Seat => "seat",
            Transition::MarkNoShow => "mark no-show",
            Transition::Withdraw => "withdraw",
            Transition::Renotify => "renotify",
        }
    }

    /// Notification enqueued when this transition commits.
    pub const fn notification(&self) -> Option<NotificationKind> {
        match self {
            Transition::Call => Some(NotificationKind::Called),
            Transition::Renotify => Some(NotificationKind::Renotified),
            _ => None,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EntryStatus {
    /// Status reached by applying `transition`, or `None` if not allowed.
    pub const fn after(self, transition: Transition) -> Option<EntryStatus> {
        use EntryStatus::*;
        match (self, transition) {
            (Waiting, Transition::Call) => Some(Called),
            (Called, Transition::Seat) => Some(Completed),
            (Called, Transition::MarkNoShow) => Some(NoShow),
            (Waiting | Called, Transition::Withdraw) => Some(Withdrawn),
            (Called, Transition::Renotify) => Some(Called),
            _ => None,
        }
    }

    /// Whether `transition` is allowed from this status.
    #[inline]
    pub const fn permits(self, transition: Transition) -> bool {
        self.after(transition).is_some()
    }
}

/// What happened, and what the caller owes the rest of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub transition: Transition,
    pub from: EntryStatus,
    pub to: EntryStatus,
    /// The entry left the waiting set; remaining positions must be recomputed.
    pub left_waiting_set: bool,
    /// Notification to enqueue in the same commit.
    pub notification: Option<NotificationKind>,
}

// =============================================================================
// Admission
// =============================================================================

/// Builds a new `Waiting` entry for `customer`.
///
/// ## Rules
/// - The queue must be open (`QueueClosed` otherwise)
/// - `waiting_count` must be below the queue's capacity (`QueueFull` otherwise)
/// - The join form must validate
///
/// The entry takes position `waiting_count + 1`; the caller still runs the
/// full recompute before committing.
pub fn admit(
    queue: &Queue,
    waiting_count: i64,
    customer: NewCustomer,
    entry_id: String,
    verification_code: String,
    now: DateTime<Utc>,
) -> CoreResult<QueueEntry> {
    if !queue.is_open {
        return Err(CoreError::QueueClosed {
            queue_id: queue.id.clone(),
        });
    }

    if !queue.has_room(waiting_count) {
        return Err(CoreError::QueueFull {
            queue_id: queue.id.clone(),
            capacity: queue.capacity.unwrap_or_default(),
        });
    }

    validate_new_customer(&customer)?;

    let position = next_position(waiting_count);
    let notes = customer
        .notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    Ok(QueueEntry {
        id: entry_id,
        queue_id: queue.id.clone(),
        merchant_id: queue.merchant_id.clone(),
        customer_name: customer.name.trim().to_string(),
        customer_phone: customer.phone.trim().to_string(),
        party_size: customer.party_size,
        notes,
        status: EntryStatus::Waiting,
        position: Some(position),
        joined_at: now,
        called_at: None,
        completed_at: None,
        estimated_wait_minutes: Some(estimated_wait_minutes(
            position,
            queue.average_service_minutes,
        )),
        verification_code,
        notification_count: 0,
        last_notified: None,
        withdraw_reason: None,
        updated_at: now,
    })
}

// =============================================================================
// Transitions on an Entry
// =============================================================================

/// Moves a waiting entry to `Called` and schedules the first notification.
pub fn call(entry: &mut QueueEntry, now: DateTime<Utc>) -> CoreResult<TransitionOutcome> {
    apply(entry, Transition::Call, now)
}

/// Seats a called entry after checking its verification code.
///
/// ## Check Order
/// ```text
/// terminal entry?        → InvalidTransition
/// code does not match?   → InvalidCode        (even while still waiting)
/// not called?            → InvalidTransition
/// otherwise              → Completed
/// ```
pub fn seat(
    entry: &mut QueueEntry,
    supplied_code: &str,
    now: DateTime<Utc>,
) -> CoreResult<TransitionOutcome> {
    if entry.is_terminal() {
        return Err(invalid(entry, Transition::Seat));
    }

    if !codes_match(&entry.verification_code, supplied_code) {
        return Err(CoreError::InvalidCode {
            entry_id: entry.id.clone(),
        });
    }

    apply(entry, Transition::Seat, now)
}

/// Declares a called customer unresponsive.
pub fn mark_no_show(entry: &mut QueueEntry, now: DateTime<Utc>) -> CoreResult<TransitionOutcome> {
    apply(entry, Transition::MarkNoShow, now)
}

/// Cancels a waiting or called entry, keeping an optional reason.
pub fn withdraw(
    entry: &mut QueueEntry,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> CoreResult<TransitionOutcome> {
    if !entry.status.permits(Transition::Withdraw) {
        return Err(invalid(entry, Transition::Withdraw));
    }
    validate_withdraw_reason(reason)?;

    let outcome = apply(entry, Transition::Withdraw, now)?;
    entry.withdraw_reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    Ok(outcome)
}

/// Re-sends the call notification (customer reconnected).
pub fn renotify(entry: &mut QueueEntry, now: DateTime<Utc>) -> CoreResult<TransitionOutcome> {
    apply(entry, Transition::Renotify, now)
}

fn apply(
    entry: &mut QueueEntry,
    transition: Transition,
    now: DateTime<Utc>,
) -> CoreResult<TransitionOutcome> {
    let from = entry.status;
    let to = from
        .after(transition)
        .ok_or_else(|| invalid(entry, transition))?;

    match transition {
        Transition::Call => {
            entry.called_at = Some(now);
            entry.notification_count += 1;
            entry.last_notified = Some(now);
        }
        Transition::Renotify => {
            entry.notification_count += 1;
            entry.last_notified = Some(now);
        }
        Transition::Seat | Transition::MarkNoShow | Transition::Withdraw => {
            entry.completed_at = Some(now);
        }
    }

    let left_waiting_set = from == EntryStatus::Waiting && to != EntryStatus::Waiting;
    if left_waiting_set {
        entry.position = None;
        entry.estimated_wait_minutes = None;
    }

    entry.status = to;
    entry.updated_at = now;

    Ok(TransitionOutcome {
        transition,
        from,
        to,
        left_waiting_set,
        notification: transition.notification(),
    })
}

fn invalid(entry: &QueueEntry, transition: Transition) -> CoreError {
    CoreError::InvalidTransition {
        entry_id: entry.id.clone(),
        from: entry.status,
        transition,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn queue(capacity: Option<i64>, is_open: bool) -> Queue {
        let now = Utc::now();
        Queue {
            id: "queue-1".to_string(),
            merchant_id: "merchant-1".to_string(),
            name: "Main Dining".to_string(),
            capacity,
            average_service_minutes: 10,
            is_open,
            created_at: now,
            updated_at: now,
        }
    }

    fn waiting_entry() -> QueueEntry {
        admit(
            &queue(None, true),
            0,
            NewCustomer::new("Ana", "+1 555 010 2030", 2),
            "entry-1".to_string(),
            "ABC234".to_string(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_admit_assigns_next_position() {
        let entry = admit(
            &queue(None, true),
            2,
            NewCustomer::new("  Ana ", "5550102030", 4),
            "e".to_string(),
            "ABC234".to_string(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(entry.status, EntryStatus::Waiting);
        assert_eq!(entry.position, Some(3));
        assert_eq!(entry.estimated_wait_minutes, Some(30));
        assert_eq!(entry.customer_name, "Ana");
        assert_eq!(entry.merchant_id, "merchant-1");
    }

    #[test]
    fn test_admit_rejects_closed_and_full_queues() {
        let closed = admit(
            &queue(None, false),
            0,
            NewCustomer::new("Ana", "5550102030", 2),
            "e".into(),
            "ABC234".into(),
            Utc::now(),
        );
        assert!(matches!(closed, Err(CoreError::QueueClosed { .. })));

        let full = admit(
            &queue(Some(3), true),
            3,
            NewCustomer::new("Ana", "5550102030", 2),
            "e".into(),
            "ABC234".into(),
            Utc::now(),
        );
        assert!(matches!(full, Err(CoreError::QueueFull { capacity: 3, .. })));
    }

    #[test]
    fn test_admit_rejects_invalid_party_size() {
        let result = admit(
            &queue(None, true),
            0,
            NewCustomer::new("Ana", "5550102030", 0),
            "e".into(),
            "ABC234".into(),
            Utc::now(),
        );
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_call_sets_notification_fields() {
        let mut entry = waiting_entry();
        let now = entry.joined_at + Duration::minutes(12);

        let outcome = call(&mut entry, now).unwrap();

        assert_eq!(outcome.from, EntryStatus::Waiting);
        assert_eq!(outcome.to, EntryStatus::Called);
        assert!(outcome.left_waiting_set);
        assert_eq!(outcome.notification, Some(NotificationKind::Called));
        assert_eq!(entry.called_at, Some(now));
        assert_eq!(entry.last_notified, Some(now));
        assert_eq!(entry.notification_count, 1);
        assert_eq!(entry.position, None);
        assert_eq!(entry.estimated_wait_minutes, None);
    }

    #[test]
    fn test_seat_requires_matching_code() {
        let mut entry = waiting_entry();
        call(&mut entry, Utc::now()).unwrap();

        let before = entry.clone();
        let err = seat(&mut entry, "ZZZZZZ", Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCode { .. }));
        assert_eq!(entry, before);

        let outcome = seat(&mut entry, "abc234", Utc::now()).unwrap();
        assert_eq!(outcome.to, EntryStatus::Completed);
        assert!(!outcome.left_waiting_set);
        assert!(entry.completed_at.is_some());
    }

    #[test]
    fn test_seat_waiting_entry() {
        let mut entry = waiting_entry();

        // Wrong code is reported before the status problem
        let err = seat(&mut entry, "WRONG1", Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCode { .. }));

        let err = seat(&mut entry, "ABC234", Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: EntryStatus::Waiting,
                transition: Transition::Seat,
                ..
            }
        ));
        assert_eq!(entry.status, EntryStatus::Waiting);
        assert_eq!(entry.position, Some(1));
    }

    #[test]
    fn test_no_show_only_from_called() {
        let mut entry = waiting_entry();
        assert!(mark_no_show(&mut entry, Utc::now()).is_err());

        call(&mut entry, Utc::now()).unwrap();
        let outcome = mark_no_show(&mut entry, Utc::now()).unwrap();
        assert_eq!(outcome.to, EntryStatus::NoShow);
        assert!(entry.completed_at.is_some());
    }

    #[test]
    fn test_withdraw_from_waiting_and_called() {
        let mut waiting = waiting_entry();
        let outcome = withdraw(&mut waiting, Some("  running late "), Utc::now()).unwrap();
        assert!(outcome.left_waiting_set);
        assert_eq!(waiting.withdraw_reason.as_deref(), Some("running late"));

        let mut called = waiting_entry();
        call(&mut called, Utc::now()).unwrap();
        let outcome = withdraw(&mut called, None, Utc::now()).unwrap();
        assert!(!outcome.left_waiting_set);
        assert_eq!(called.status, EntryStatus::Withdrawn);
    }

    #[test]
    fn test_renotify_only_from_called() {
        let mut entry = waiting_entry();
        assert!(renotify(&mut entry, Utc::now()).is_err());

        call(&mut entry, Utc::now()).unwrap();
        let later = Utc::now() + Duration::minutes(3);
        let outcome = renotify(&mut entry, later).unwrap();

        assert_eq!(outcome.to, EntryStatus::Called);
        assert_eq!(outcome.notification, Some(NotificationKind::Renotified));
        assert_eq!(entry.notification_count, 2);
        assert_eq!(entry.last_notified, Some(later));
    }

    #[test]
    fn test_terminal_statuses_are_immutable() {
        let mut completed = waiting_entry();
        call(&mut completed, Utc::now()).unwrap();
        seat(&mut completed, "ABC234", Utc::now()).unwrap();

        let mut no_show = waiting_entry();
        call(&mut no_show, Utc::now()).unwrap();
        mark_no_show(&mut no_show, Utc::now()).unwrap();

        let mut withdrawn = waiting_entry();
        withdraw(&mut withdrawn, None, Utc::now()).unwrap();

        for entry in [completed, no_show, withdrawn] {
            let mut e = entry.clone();
            let now = Utc::now();
            let results = [
                call(&mut e, now),
                seat(&mut e, "ABC234", now),
                seat(&mut e, "WRONG1", now),
                mark_no_show(&mut e, now),
                withdraw(&mut e, Some("again"), now),
                renotify(&mut e, now),
            ];
            for result in results {
                assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
            }
            assert_eq!(e, entry);
        }
    }

    #[test]
    fn test_transition_table() {
        use EntryStatus::*;
        assert_eq!(Waiting.after(Transition::Call), Some(Called));
        assert_eq!(Waiting.after(Transition::Seat), None);
        assert_eq!(Waiting.after(Transition::Renotify), None);
        assert_eq!(Called.after(Transition::Call), None);
        assert_eq!(Called.after(Transition::Withdraw), Some(Withdrawn));
        for status in [Completed, NoShow, Withdrawn] {
            assert!(!status.permits(Transition::Withdraw));
        }
    }
}
