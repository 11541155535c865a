//! Subscription and hash-cache bookkeeping
//!
//! The registry keeps two maps keyed by owner: the subscribed item IDs and
//! the last-seen value hash per item. Every owner present in the hash cache is
//! also present in the subscription map. Owners are only removed through
//! [`SubscriptionRegistry::drop_if_empty`], which clears both maps together.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Outcome of comparing a fetched hash against the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sighting or hash differs from the cached one
    Changed,
    /// Hash equals the cached one
    Unchanged,
    /// The owner/item was unsubscribed while the fetch was in flight
    NotSubscribed,
}

/// Owner-keyed subscriptions plus the last-seen value hashes
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry<Id>
where
    Id: Clone + Ord + Hash,
{
    /// owner -> subscribed item IDs
    subscriptions: HashMap<String, BTreeSet<Id>>,

    /// owner -> item ID -> last-seen value hash
    hashes: HashMap<String, HashMap<Id, String>>,
}

impl<Id> SubscriptionRegistry<Id>
where
    Id: Clone + Ord + Hash,
{
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            hashes: HashMap::new(),
        }
    }

    /// Add `ids` to `owner`'s subscription set, returning how many were new
    pub fn subscribe(&mut self, owner: &str, ids: impl IntoIterator<Item = Id>) -> usize {
        let set = self.subscriptions.entry(owner.to_string()).or_default();
        let added = ids.into_iter().filter(|id| set.insert(id.clone())).count();

        // subscribe(owner, []) must not leave an empty owner behind
        self.drop_if_empty(owner);
        added
    }

    /// Remove `ids` from `owner`, returning how many were actually removed
    pub fn unsubscribe(&mut self, owner: &str, ids: impl IntoIterator<Item = Id>) -> usize {
        let Some(set) = self.subscriptions.get_mut(owner) else {
            return 0;
        };

        let mut removed = 0;
        let mut cache = self.hashes.get_mut(owner);
        for id in ids {
            if set.remove(&id) {
                removed += 1;
            }
            if let Some(cache) = cache.as_mut() {
                cache.remove(&id);
            }
        }

        self.drop_if_empty(owner);
        removed
    }

    /// Remove every subscription of `owner`, returning whether it existed
    pub fn unsubscribe_all(&mut self, owner: &str) -> bool {
        let existed = match self.subscriptions.get_mut(owner) {
            Some(set) => {
                set.clear();
                true
            }
            None => false,
        };
        self.drop_if_empty(owner);
        existed
    }

    /// Drops both map entries for `owner` once it has no subscribed IDs left.
    fn drop_if_empty(&mut self, owner: &str) {
        let empty = self
            .subscriptions
            .get(owner)
            .map_or(true, |set| set.is_empty());

        if empty {
            self.subscriptions.remove(owner);
            self.hashes.remove(owner);
        }
    }

    /// Copy of the current subscriptions, ordered by owner
    pub fn snapshot(&self) -> Vec<(String, Vec<Id>)> {
        let mut owners: Vec<(String, Vec<Id>)> = self
            .subscriptions
            .iter()
            .map(|(owner, ids)| (owner.clone(), ids.iter().cloned().collect()))
            .collect();
        owners.sort_by(|a, b| a.0.cmp(&b.0));
        owners
    }

    /// Compare `hash` against the cache and refresh it on change
    pub fn observe(&mut self, owner: &str, id: &Id, hash: String) -> Observation {
        if !self.is_subscribed(owner, id) {
            return Observation::NotSubscribed;
        }

        let cache = self.hashes.entry(owner.to_string()).or_default();
        match cache.get(id) {
            Some(previous) if *previous == hash => Observation::Unchanged,
            _ => {
                cache.insert(id.clone(), hash);
                Observation::Changed
            }
        }
    }

    /// Store `hash` unconditionally, returning false if the item is no longer subscribed
    pub fn store(&mut self, owner: &str, id: &Id, hash: String) -> bool {
        if !self.is_subscribed(owner, id) {
            return false;
        }
        self.hashes
            .entry(owner.to_string())
            .or_default()
            .insert(id.clone(), hash);
        true
    }

    pub fn is_subscribed(&self, owner: &str, id: &Id) -> bool {
        self.subscriptions
            .get(owner)
            .is_some_and(|set| set.contains(id))
    }

    /// Subscribed IDs for `owner`, if any
    pub fn ids_for(&self, owner: &str) -> Option<Vec<Id>> {
        self.subscriptions
            .get(owner)
            .map(|set| set.iter().cloned().collect())
    }

    pub fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self.subscriptions.keys().cloned().collect();
        owners.sort();
        owners
    }

    pub fn cached_hash(&self, owner: &str, id: &Id) -> Option<&str> {
        self.hashes.get(owner)?.get(id).map(String::as_str)
    }

    /// Whether the hash cache holds an entry for `owner`
    pub fn has_cache_entry(&self, owner: &str) -> bool {
        self.hashes.contains_key(owner)
    }

    pub fn owner_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Total number of subscribed items across all owners
    pub fn item_count(&self) -> usize {
        self.subscriptions.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Owners with a hash-cache entry but no subscription. Always empty.
    pub fn orphaned_cache_owners(&self) -> Vec<String> {
        self.hashes
            .keys()
            .filter(|owner| !self.subscriptions.contains_key(*owner))
            .cloned()
            .collect()
    }
}

impl<Id> Default for SubscriptionRegistry<Id>
where
    Id: Clone + Ord + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        assert_eq!(registry.subscribe("Reactor1", [1u64, 2, 3]), 3);
        assert_eq!(registry.subscribe("Reactor1", [2u64, 3, 4]), 1);
        assert_eq!(registry.ids_for("Reactor1"), Some(vec![1, 2, 3, 4]));
        assert_eq!(registry.item_count(), 4);
    }

    #[test]
    fn test_subscribe_empty_leaves_no_owner() {
        let mut registry = SubscriptionRegistry::<u64>::new();
        assert_eq!(registry.subscribe("Reactor1", []), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unsubscribe_last_id_removes_both_maps() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("Reactor1", [1u64, 2]);
        registry.observe("Reactor1", &1, "a".to_string());
        registry.observe("Reactor1", &2, "b".to_string());
        assert!(registry.has_cache_entry("Reactor1"));

        assert_eq!(registry.unsubscribe("Reactor1", [1u64]), 1);
        assert!(registry.has_cache_entry("Reactor1"));
        assert_eq!(registry.cached_hash("Reactor1", &1), None);
        assert_eq!(registry.cached_hash("Reactor1", &2), Some("b"));

        assert_eq!(registry.unsubscribe("Reactor1", [2u64]), 1);
        assert!(registry.ids_for("Reactor1").is_none());
        assert!(!registry.has_cache_entry("Reactor1"));
    }

    #[test]
    fn test_unsubscribe_unknown_owner() {
        let mut registry = SubscriptionRegistry::<u64>::new();
        assert_eq!(registry.unsubscribe("nobody", [1]), 0);
        assert!(!registry.unsubscribe_all("nobody"));
    }

    #[test]
    fn test_unsubscribe_all() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("Reactor1", [1u64, 2]);
        registry.observe("Reactor1", &1, "a".to_string());
        assert!(registry.unsubscribe_all("Reactor1"));
        assert!(registry.is_empty());
        assert!(!registry.has_cache_entry("Reactor1"));
    }

    #[test]
    fn test_observe_detects_changes() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("Reactor1", [7u64]);

        assert_eq!(registry.observe("Reactor1", &7, "v1".into()), Observation::Changed);
        assert_eq!(registry.observe("Reactor1", &7, "v1".into()), Observation::Unchanged);
        assert_eq!(registry.observe("Reactor1", &7, "v2".into()), Observation::Changed);
        assert_eq!(registry.cached_hash("Reactor1", &7), Some("v2"));
    }

    #[test]
    fn test_observe_after_unsubscribe_does_not_resurrect_cache() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("Reactor1", [7u64]);
        registry.unsubscribe("Reactor1", [7u64]);

        assert_eq!(
            registry.observe("Reactor1", &7, "v1".into()),
            Observation::NotSubscribed
        );
        assert!(!registry.store("Reactor1", &7, "v1".into()));
        assert!(!registry.has_cache_entry("Reactor1"));
    }

    #[test]
    fn test_snapshot_is_sorted_copy() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("b", [2u64, 1]);
        registry.subscribe("a", [3u64]);

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot,
            vec![("a".to_string(), vec![3]), ("b".to_string(), vec![1, 2])]
        );

        registry.unsubscribe_all("a");
        assert_eq!(snapshot.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_unsubscribing_everything_leaves_no_keys(
            owners in proptest::collection::vec(("[a-d]", proptest::collection::vec(0u64..20, 0..8)), 1..10)
        ) {
            let mut registry = SubscriptionRegistry::new();
            for (owner, ids) in &owners {
                registry.subscribe(owner, ids.iter().copied());
                for id in ids {
                    registry.observe(owner, id, format!("{id}"));
                }
            }
            prop_assert!(registry.orphaned_cache_owners().is_empty());

            for (owner, ids) in &owners {
                registry.unsubscribe(owner, ids.iter().copied());
                prop_assert!(registry.orphaned_cache_owners().is_empty());
            }

            prop_assert!(registry.is_empty());
            for (owner, _) in &owners {
                prop_assert!(!registry.has_cache_entry(owner));
            }
        }
    }
}
