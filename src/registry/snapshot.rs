//! Immutable per-backend target snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::target::{BackendClass, Target, TargetId};

/// Enabled targets of one backend class at one refresh.
#[derive(Debug, Clone)]
pub struct TargetSet {
    backend: BackendClass,
    generation: u64,
    targets: BTreeMap<TargetId, Arc<Target>>,
}

impl TargetSet {
    pub fn empty(backend: BackendClass) -> Self {
        Self {
            backend,
            generation: 0,
            targets: BTreeMap::new(),
        }
    }

    /// Build a set from targets; disabled targets and other backends are dropped.
    pub fn from_targets<I>(backend: BackendClass, generation: u64, targets: I) -> Self
    where
        I: IntoIterator<Item = Arc<Target>>,
    {
        let targets = targets
            .into_iter()
            .filter(|t| t.enabled && t.backend == backend)
            .map(|t| (t.id.clone(), t))
            .collect();
        Self {
            backend,
            generation,
            targets,
        }
    }

    pub fn backend(&self) -> BackendClass {
        self.backend
    }

    /// Refresh counter; 0 means the registry has not loaded this backend yet.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: &TargetId) -> Option<&Arc<Target>> {
        self.targets.get(id)
    }

    pub fn contains(&self, id: &TargetId) -> bool {
        self.targets.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TargetId> {
        self.targets.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Target>> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Structural comparison by id against an older set.
    pub fn diff(&self, previous: &TargetSet) -> TargetSetDiff {
        let mut diff = TargetSetDiff::default();
        for (id, target) in &self.targets {
            match previous.targets.get(id) {
                None => {
                    diff.added.insert(id.clone());
                }
                Some(old) if old.as_ref() != target.as_ref() => {
                    diff.changed.insert(id.clone());
                }
                Some(_) => {}
            }
        }
        for id in previous.targets.keys() {
            if !self.targets.contains_key(id) {
                diff.removed.insert(id.clone());
            }
        }
        diff
    }
}

/// Ids that appeared, disappeared or whose definition changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSetDiff {
    pub added: BTreeSet<TargetId>,
    pub removed: BTreeSet<TargetId>,
    pub changed: BTreeSet<TargetId>,
}

impl TargetSetDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::WorkloadFlags;

    fn target(id: &str, enabled: bool, connections: usize) -> Arc<Target> {
        Arc::new(Target {
            id: TargetId::new(id),
            backend: BackendClass::Postgres,
            connection_string: "postgres://db/github".into(),
            database: None,
            enabled,
            connections,
            workloads: WorkloadFlags::default(),
            sleep_ms: 0,
            position: 0,
        })
    }

    #[test]
    fn test_disabled_targets_excluded() {
        let set = TargetSet::from_targets(
            BackendClass::Postgres,
            1,
            vec![target("a", true, 1), target("b", false, 1)],
        );
        assert_eq!(set.len(), 1);
        assert!(set.contains(&"a".into()));
        assert!(!set.contains(&"b".into()));
    }

    #[test]
    fn test_diff() {
        let old = TargetSet::from_targets(
            BackendClass::Postgres,
            1,
            vec![target("a", true, 1), target("b", true, 1)],
        );
        let new = TargetSet::from_targets(
            BackendClass::Postgres,
            2,
            vec![target("b", true, 3), target("c", true, 1)],
        );
        let diff = new.diff(&old);
        assert_eq!(diff.added, BTreeSet::from([TargetId::from("c")]));
        assert_eq!(diff.removed, BTreeSet::from([TargetId::from("a")]));
        assert_eq!(diff.changed, BTreeSet::from([TargetId::from("b")]));
        assert!(new.diff(&new).is_empty());
    }
}
