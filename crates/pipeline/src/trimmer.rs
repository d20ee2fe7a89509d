//! History trimming.
//!
//! Cost is a character-count proxy for tokens: user text + assistant text +
//! raw text of each item.

use ragrelay_core::history::{HistoryItem, HistoryItems};

/// Keep the newest items whose running cost stays within `budget`.
///
/// Walks newest to oldest and stops at the first item that would push the
/// sum over the budget; that item and everything older are dropped. The
/// result is always a chronological suffix of `items`.
pub fn trim(items: &[HistoryItem], budget: usize) -> HistoryItems {
    let mut total = 0usize;
    let mut start = items.len();

    for (i, item) in items.iter().enumerate().rev() {
        let cost = item.cost();
        if total + cost > budget {
            break;
        }
        total += cost;
        start = i;
    }

    items[start..].to_vec()
}
