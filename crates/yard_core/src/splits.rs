use std::collections::{BTreeMap, BTreeSet};

use crate::{StructureId, YardId};

/// Which yards want to hear about a structure splitting apart.
///
/// Registrations are explicit so they can always be released: on disable,
/// when a structure leaves a yard's working set, when it closes and when the
/// yard itself goes away.
#[derive(Debug, Default, Clone)]
pub struct SplitRegistry {
    subscriptions: BTreeMap<StructureId, BTreeSet<YardId>>,
}

impl SplitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the yard was already subscribed.
    pub fn subscribe(&mut self, structure: StructureId, yard: YardId) -> bool {
        self.subscriptions.entry(structure).or_default().insert(yard)
    }

    pub fn unsubscribe(&mut self, structure: StructureId, yard: YardId) -> bool {
        let Some(yards) = self.subscriptions.get_mut(&structure) else {
            return false;
        };
        let removed = yards.remove(&yard);
        if yards.is_empty() {
            self.subscriptions.remove(&structure);
        }
        removed
    }

    /// Release every registration held by `yard`.
    pub fn unsubscribe_yard(&mut self, yard: YardId) -> usize {
        let mut released = 0;
        self.subscriptions.retain(|_, yards| {
            if yards.remove(&yard) {
                released += 1;
            }
            !yards.is_empty()
        });
        released
    }

    /// Drop all registrations for a structure that no longer exists.
    pub fn forget_structure(&mut self, structure: StructureId) -> Vec<YardId> {
        self.subscriptions
            .remove(&structure)
            .map(|yards| yards.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn subscribers(&self, structure: StructureId) -> Vec<YardId> {
        self.subscriptions
            .get(&structure)
            .map(|yards| yards.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, structure: StructureId, yard: YardId) -> bool {
        self.subscriptions
            .get(&structure)
            .is_some_and(|yards| yards.contains(&yard))
    }

    /// Total registrations across all structures.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(BTreeSet::len).sum()
    }

    pub fn structures(&self) -> impl Iterator<Item = StructureId> + '_ {
        self.subscriptions.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_is_idempotent() {
        let mut registry = SplitRegistry::new();
        assert!(registry.subscribe(StructureId(1), YardId(1)));
        assert!(!registry.subscribe(StructureId(1), YardId(1)));
        assert_eq!(registry.subscription_count(), 1);
    }

    #[test]
    fn unsubscribe_yard_releases_everything() {
        let mut registry = SplitRegistry::new();
        registry.subscribe(StructureId(1), YardId(1));
        registry.subscribe(StructureId(2), YardId(1));
        registry.subscribe(StructureId(2), YardId(2));
        assert_eq!(registry.unsubscribe_yard(YardId(1)), 2);
        assert_eq!(registry.subscription_count(), 1);
        assert_eq!(registry.subscribers(StructureId(2)), vec![YardId(2)]);
        assert!(registry.subscribers(StructureId(1)).is_empty());
    }

    #[test]
    fn forget_structure_returns_former_subscribers() {
        let mut registry = SplitRegistry::new();
        registry.subscribe(StructureId(7), YardId(3));
        registry.subscribe(StructureId(7), YardId(1));
        assert_eq!(
            registry.forget_structure(StructureId(7)),
            vec![YardId(1), YardId(3)]
        );
        assert_eq!(registry.subscription_count(), 0);
    }
}
