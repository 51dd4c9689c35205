//! Collection helpers shared by the engines

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Deduplicate while preserving first-seen order
#[inline]
pub fn unique_ordered<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Group items by a key extracted from each element
#[inline]
pub fn group_by<T, K, F>(items: impl IntoIterator<Item = T>, key_fn: F) -> HashMap<K, Vec<T>>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut map: HashMap<K, Vec<T>> = HashMap::new();
    for item in items {
        map.entry(key_fn(&item)).or_default().push(item);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ordered_keeps_first_occurrence() {
        let items = vec!["b", "a", "b", "c", "a"];
        assert_eq!(unique_ordered(items), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_group_by() {
        let items = vec![1, 2, 3, 4, 5];
        let grouped = group_by(items, |n| n % 2);
        assert_eq!(grouped[&0], vec![2, 4]);
        assert_eq!(grouped[&1], vec![1, 3, 5]);
    }
}
