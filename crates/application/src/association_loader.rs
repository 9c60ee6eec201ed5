//! Index alignment for batch association loading.
//!
//! Loaders fetch grouped child rows for many parent keys in one round trip.
//! The storage layer returns one entry per key that has children, in no
//! particular order; callers rely on receiving exactly one group per input
//! key, at the same index, without re-checking keys.

use std::collections::HashMap;
use std::hash::Hash;

/// Reorders grouped rows so that `result[i]` belongs to `keys[i]`.
///
/// Keys without rows get an empty group and duplicate keys receive copies of
/// the same group. Rows keyed by values outside `keys` are dropped.
pub fn align_groups<K, V, I>(keys: &[K], grouped: I) -> Vec<Vec<V>>
where
    K: Eq + Hash,
    V: Clone,
    I: IntoIterator<Item = (K, Vec<V>)>,
{
    if keys.is_empty() {
        return Vec::new();
    }

    let mut by_key: HashMap<K, Vec<V>> = HashMap::new();
    for (key, values) in grouped {
        by_key.entry(key).or_default().extend(values);
    }

    keys.iter()
        .map(|key| by_key.get(key).cloned().unwrap_or_default())
        .collect()
}

/// Returns the keys with duplicates removed, keeping first occurrences.
pub fn distinct_keys<K: Eq + Hash + Copy>(keys: &[K]) -> Vec<K> {
    let mut seen = std::collections::HashSet::with_capacity(keys.len());
    keys.iter().copied().filter(|key| seen.insert(*key)).collect()
}
