//! Tag set reconciliation

use std::collections::BTreeSet;

use crate::identity::TagId;

/// Difference between a banner's current and requested tag sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    pub to_add: BTreeSet<TagId>,
    pub to_remove: BTreeSet<TagId>,
}

impl TagDiff {
    /// `to_add = requested - current`, `to_remove = current - requested`.
    pub fn between(current: &BTreeSet<TagId>, requested: &BTreeSet<TagId>) -> Self {
        Self {
            to_add: requested.difference(current).copied().collect(),
            to_remove: current.difference(requested).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Apply additions first, then removals. Returns the tag set observed
    /// after each step.
    pub fn apply(&self, current: &BTreeSet<TagId>) -> (BTreeSet<TagId>, BTreeSet<TagId>) {
        let after_add: BTreeSet<TagId> = current.union(&self.to_add).copied().collect();
        let after_remove: BTreeSet<TagId> = after_add.difference(&self.to_remove).copied().collect();
        (after_add, after_remove)
    }
}
