//! Active set bookkeeping.

use crate::backend::BackendId;
use std::collections::VecDeque;

/// Backends currently kept warm.
///
/// Members are ordered by when they joined, so the front is always the
/// least-recently-rotated member.
#[derive(Debug, Clone)]
pub struct ActiveSet {
    members: VecDeque<BackendId>,
    max_active: usize,
    /// Last backend brought in by rotation; the next candidate search starts after it.
    cursor: Option<BackendId>,
}

/// What a rotation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub evicted: Option<BackendId>,
    pub added: BackendId,
}

impl ActiveSet {
    /// Initial set: the lowest id (the primary) plus the next backends in
    /// registry order, up to `max_active`.
    pub fn initial(registry: &[BackendId], max_active: usize) -> Self {
        let max_active = max_active.max(1);
        let mut members = VecDeque::new();

        if let Some(&primary) = registry.iter().min() {
            members.push_back(primary);
            members.extend(
                registry
                    .iter()
                    .copied()
                    .filter(|&id| id != primary)
                    .take(max_active.saturating_sub(1)),
            );
        }

        let cursor = members.back().copied();
        Self {
            members,
            max_active,
            cursor,
        }
    }

    pub fn members(&self) -> Vec<BackendId> {
        self.members.iter().copied().collect()
    }

    pub fn contains(&self, id: BackendId) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn set_max_active(&mut self, max_active: usize) {
        self.max_active = max_active.max(1);
    }

    /// Add a woken backend without evicting anything.
    pub fn insert(&mut self, id: BackendId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.members.push_back(id);
        true
    }

    pub fn remove(&mut self, id: BackendId) -> bool {
        let before = self.members.len();
        self.members.retain(|&m| m != id);
        before != self.members.len()
    }

    /// Swap the least-recently-rotated member for the next inactive backend
    /// in registry order, then trim back to the nominal size.
    ///
    /// Returns `None` when every registered backend is already active.
    pub fn rotate(&mut self, registry: &[BackendId]) -> Option<Rotation> {
        self.members.retain(|id| registry.contains(id));

        let rotation = self.next_candidate(registry).map(|added| {
            let limit = self.max_active.min(registry.len());
            let evicted = if self.members.len() >= limit {
                self.members.pop_front()
            } else {
                None
            };
            self.members.push_back(added);
            self.cursor = Some(added);
            Rotation { evicted, added }
        });

        let limit = self.max_active.min(registry.len()).max(1);
        while self.members.len() > limit {
            self.members.pop_front();
        }

        rotation
    }

    fn next_candidate(&self, registry: &[BackendId]) -> Option<BackendId> {
        if registry.is_empty() {
            return None;
        }
        let start = self
            .cursor
            .and_then(|c| registry.iter().position(|&id| id == c))
            .map(|pos| pos + 1)
            .unwrap_or(0);

        (0..registry.len())
            .map(|offset| registry[(start + offset) % registry.len()])
            .find(|id| !self.contains(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_initial_includes_primary() {
        let set = ActiveSet::initial(&[3, 1, 2], 2);
        assert_eq!(set.members(), vec![1, 3]);

        let set = ActiveSet::initial(&[1, 2, 3, 4], 2);
        assert_eq!(set.members(), vec![1, 2]);
    }

    #[test]
    fn test_initial_clamped_to_registry() {
        let set = ActiveSet::initial(&[1, 2], 5);
        assert_eq!(set.members(), vec![1, 2]);
    }

    #[test]
    fn test_rotation_order() {
        let registry = [1, 2, 3];
        let mut set = ActiveSet::initial(&registry, 2);

        assert_eq!(
            set.rotate(&registry),
            Some(Rotation { evicted: Some(1), added: 3 })
        );
        assert_eq!(set.members(), vec![2, 3]);

        assert_eq!(
            set.rotate(&registry),
            Some(Rotation { evicted: Some(2), added: 1 })
        );
        assert_eq!(set.members(), vec![3, 1]);

        set.rotate(&registry);
        assert_eq!(set.members(), vec![1, 2]);
    }

    #[test]
    fn test_rotation_skipped_when_all_active() {
        let registry = [1, 2];
        let mut set = ActiveSet::initial(&registry, 2);
        assert!(set.rotate(&registry).is_none());
        assert_eq!(set.members(), vec![1, 2]);
    }

    #[test]
    fn test_woken_member_trimmed_on_rotation() {
        let registry = [1, 2, 3, 4];
        let mut set = ActiveSet::initial(&registry, 2);
        assert!(set.insert(4));
        assert!(!set.insert(4));
        assert_eq!(set.len(), 3);

        let rotation = set.rotate(&registry).unwrap();
        assert_eq!(rotation.added, 3);
        assert_eq!(set.len(), 2);
        assert_eq!(set.members(), vec![4, 3]);
    }

    #[test]
    fn test_removed_backends_dropped() {
        let mut set = ActiveSet::initial(&[1, 2, 3], 2);
        let rotation = set.rotate(&[1, 3]).unwrap();
        // 2 is gone, so 3 fills the free slot without evicting the primary
        assert_eq!(rotation, Rotation { evicted: None, added: 3 });
        assert_eq!(set.members(), vec![1, 3]);
    }

    #[test]
    fn test_shrinking_max_active() {
        let registry = [1, 2, 3, 4, 5];
        let mut set = ActiveSet::initial(&registry, 3);
        set.set_max_active(1);
        set.rotate(&registry);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_rotation_covers_every_backend() {
        let registry: Vec<BackendId> = (1..=7).collect();
        let mut set = ActiveSet::initial(&registry, 2);
        let mut seen: HashSet<BackendId> = set.members().into_iter().collect();

        for _ in 0..registry.len() {
            set.rotate(&registry);
            seen.extend(set.members());
        }
        assert_eq!(seen.len(), registry.len());
    }
}
