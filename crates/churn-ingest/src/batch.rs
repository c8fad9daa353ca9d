//! Statement batching
//!
//! Postgres rejects an `INSERT ... ON CONFLICT DO UPDATE` that touches the
//! same row twice. Batches are therefore cut both at the size limit and
//! right before a conflict key that the current batch already holds. Rows
//! keep file order across batches, so a later duplicate lands in a later
//! statement and overwrites the earlier one.

use std::collections::HashSet;
use std::hash::Hash;

/// Split `items` into contiguous batches of at most `max_len` with no repeated key
pub fn partition_by_key<'a, T, K, F>(items: &'a [T], max_len: usize, key: F) -> Vec<&'a [T]>
where
    K: Eq + Hash,
    F: Fn(&'a T) -> K,
{
    let max_len = max_len.max(1);
    let mut batches = Vec::new();
    let mut seen = HashSet::new();
    let mut start = 0;

    for (idx, item) in items.iter().enumerate() {
        let item_key = key(item);
        if idx - start == max_len || seen.contains(&item_key) {
            batches.push(&items[start..idx]);
            start = idx;
            seen.clear();
        }
        seen.insert(item_key);
    }

    if start < items.len() {
        batches.push(&items[start..]);
    }

    batches
}
