//! Context windowing policy
//!
//! Given an ordered conversation history and a token budget, selects a
//! deterministic subsequence to send upstream. The rule is fixed and
//! cheap: no re-ranking, no similarity scoring. It favors the earliest
//! messages (original intent) and the recent majority (continuity), with
//! sparse samples from the middle.
//!
//! The selection is index-based, so a single oversized message inside a
//! retained zone can push the result past the budget. Callers must not
//! assume strict enforcement; the rule itself is the contract.

use crate::storage::{Message, Role};
use crate::tokens::estimate;
use std::collections::BTreeSet;

/// Sampling stride for the middle zone
const MIDDLE_SAMPLE_STRIDE: usize = 10;

/// Selects an order-preserving subset of `messages` for the upstream call
///
/// Returns all messages unchanged when their total estimated token count
/// fits within `budget`. Otherwise keeps the union of three index zones,
/// deduplicated and ascending:
///
/// - the earliest fifth of the history,
/// - everything from the 40% mark onward,
/// - every 10th index in between.
///
/// Messages with the `system` role are always retained, regardless of
/// where they fall.
pub fn select(messages: &[Message], budget: usize) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    let total: usize = messages.iter().map(|m| estimate(&m.content)).sum();
    if total <= budget {
        return messages.to_vec();
    }

    let n = messages.len();
    let early_end = n / 5;
    let recent_start = n * 2 / 5;

    let mut keep: BTreeSet<usize> = BTreeSet::new();
    keep.extend(0..early_end);
    keep.extend(recent_start..n);
    keep.extend((early_end..recent_start).step_by(MIDDLE_SAMPLE_STRIDE));

    for (idx, message) in messages.iter().enumerate() {
        if message.role == Role::System {
            keep.insert(idx);
        }
    }

    keep.into_iter().map(|idx| messages[idx].clone()).collect()
}
