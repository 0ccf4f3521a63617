//! # Position Recompute
//!
//! Positions are never patched in place. Every mutating event recomputes them
//! from scratch out of the set of entries that are still `Waiting`.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Waiting set (any order)          Recompute            Assigned         │
//! │  ───────────────────────          ─────────            ────────         │
//! │  C  joined 12:05  pos 3                                A → 1  (10 min)  │
//! │  A  joined 12:00  pos 1   ──►  sort by joined_at  ──►  C → 2  (20 min)  │
//! │  D  joined 12:07  pos 4        index + 1               D → 3  (30 min)  │
//! │  (B was called: no longer in the set)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The result is always dense (`1..=N`) no matter what the stored positions
//! looked like before, so a crash between writes can never leave a gap behind.

use chrono::{DateTime, Utc};

/// The fields of a waiting entry the recompute needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingSlot {
    pub entry_id: String,
    pub joined_at: DateTime<Utc>,
    /// Position currently stored, used only to break `joined_at` ties.
    pub position: Option<i64>,
}

/// A freshly computed position for one waiting entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionAssignment {
    pub entry_id: String,
    pub position: i64,
    pub estimated_wait_minutes: i64,
}

/// Recomputes positions for the waiting set of one queue.
///
/// ## Ordering
/// 1. `joined_at` ascending
/// 2. previously stored position (keeps a stable order for same-instant joins)
/// 3. entry id
///
/// ## Example
/// ```rust
/// use chrono::{Duration, Utc};
/// use waitlist_core::position::{recompute_positions, WaitingSlot};
///
/// let t0 = Utc::now();
/// let slots = vec![
///     WaitingSlot { entry_id: "c".into(), joined_at: t0 + Duration::minutes(2), position: Some(3) },
///     WaitingSlot { entry_id: "b".into(), joined_at: t0 + Duration::minutes(1), position: Some(2) },
/// ];
///
/// let assigned = recompute_positions(&slots, 10);
/// assert_eq!(assigned[0].entry_id, "b");
/// assert_eq!(assigned[0].position, 1);
/// assert_eq!(assigned[1].estimated_wait_minutes, 20);
/// ```
pub fn recompute_positions(
    waiting: &[WaitingSlot],
    average_service_minutes: i64,
) -> Vec<PositionAssignment> {
    let mut ordered: Vec<&WaitingSlot> = waiting.iter().collect();
    ordered.sort_by(|a, b| {
        a.joined_at
            .cmp(&b.joined_at)
            .then_with(|| {
                a.position
                    .unwrap_or(i64::MAX)
                    .cmp(&b.position.unwrap_or(i64::MAX))
            })
            .then_with(|| a.entry_id.cmp(&b.entry_id))
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            let position = index as i64 + 1;
            PositionAssignment {
                entry_id: slot.entry_id.clone(),
                position,
                estimated_wait_minutes: estimated_wait_minutes(position, average_service_minutes),
            }
        })
        .collect()
}

/// `position × average_service_minutes`, saturating.
#[inline]
pub fn estimated_wait_minutes(position: i64, average_service_minutes: i64) -> i64 {
    position.saturating_mul(average_service_minutes)
}

/// Position a newly admitted entry takes behind `waiting_count` others.
#[inline]
pub fn next_position(waiting_count: i64) -> i64 {
    waiting_count + 1
}

/// Checks that `positions` is exactly `1..=N` in some order.
pub fn is_dense(positions: &[i64]) -> bool {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(index, &position)| position == index as i64 + 1)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn slot(id: &str, offset_secs: i64, position: Option<i64>, t0: DateTime<Utc>) -> WaitingSlot {
        WaitingSlot {
            entry_id: id.to_string(),
            joined_at: t0 + Duration::seconds(offset_secs),
            position,
        }
    }

    #[test]
    fn test_recompute_closes_gap() {
        let t0 = Utc::now();
        // B (position 2) left the waiting set
        let slots = vec![
            slot("a", 0, Some(1), t0),
            slot("c", 20, Some(3), t0),
            slot("d", 30, Some(4), t0),
        ];

        let assigned = recompute_positions(&slots, 10);
        let positions: Vec<(String, i64)> = assigned
            .iter()
            .map(|a| (a.entry_id.clone(), a.position))
            .collect();

        assert_eq!(
            positions,
            vec![("a".into(), 1), ("c".into(), 2), ("d".into(), 3)]
        );
        assert_eq!(assigned[2].estimated_wait_minutes, 30);
    }

    #[test]
    fn test_recompute_orders_by_join_time_not_stored_position() {
        let t0 = Utc::now();
        // Stored positions are corrupt (duplicate + gap); join order wins.
        let slots = vec![
            slot("late", 50, Some(1), t0),
            slot("early", 10, Some(1), t0),
            slot("mid", 30, Some(7), t0),
        ];

        let assigned = recompute_positions(&slots, 5);
        let order: Vec<&str> = assigned.iter().map(|a| a.entry_id.as_str()).collect();
        assert_eq!(order, vec!["early", "mid", "late"]);
        assert!(is_dense(&assigned.iter().map(|a| a.position).collect::<Vec<_>>()));
    }

    #[test]
    fn test_same_instant_joins_keep_stored_order() {
        let t0 = Utc::now();
        let slots = vec![
            slot("zz", 0, Some(1), t0),
            slot("aa", 0, Some(2), t0),
            slot("new", 0, None, t0),
        ];

        let assigned = recompute_positions(&slots, 10);
        let order: Vec<&str> = assigned.iter().map(|a| a.entry_id.as_str()).collect();
        assert_eq!(order, vec!["zz", "aa", "new"]);
    }

    #[test]
    fn test_empty_waiting_set() {
        assert!(recompute_positions(&[], 10).is_empty());
        assert!(is_dense(&[]));
    }

    #[test]
    fn test_is_dense() {
        assert!(is_dense(&[2, 1, 3]));
        assert!(!is_dense(&[1, 1, 2]));
        assert!(!is_dense(&[1, 3]));
        assert!(!is_dense(&[0, 1]));
    }

    #[test]
    fn test_estimated_wait_saturates() {
        assert_eq!(estimated_wait_minutes(3, 10), 30);
        assert_eq!(estimated_wait_minutes(i64::MAX, 2), i64::MAX);
        assert_eq!(next_position(0), 1);
    }
}
