//! Spatial classifier: which nearby structures sit fully inside a yard box
//! and which only overlap it.

use std::collections::BTreeSet;

use crate::geometry::OrientedBox;
use crate::host::StructureProvider;
use crate::{StructureId, StructureView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Contained,
    Intersecting,
    Outside,
}

impl Placement {
    pub fn of(yard_box: &OrientedBox, bounds: &OrientedBox) -> Self {
        if yard_box.contains_box(bounds) {
            Placement::Contained
        } else if yard_box.intersects(bounds) {
            Placement::Intersecting
        } else {
            Placement::Outside
        }
    }
}

/// Disjoint contained / intersecting sets for one yard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub contained: BTreeSet<StructureId>,
    pub intersecting: BTreeSet<StructureId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifyDelta {
    pub added: Vec<StructureId>,
    pub removed: Vec<StructureId>,
}

impl ClassifyDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl Classification {
    pub fn placement(&self, id: StructureId) -> Placement {
        if self.contained.contains(&id) {
            Placement::Contained
        } else if self.intersecting.contains(&id) {
            Placement::Intersecting
        } else {
            Placement::Outside
        }
    }

    /// Present in either set.
    pub fn touches(&self, id: StructureId) -> bool {
        self.contained.contains(&id) || self.intersecting.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.contained.len() + self.intersecting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contained.is_empty() && self.intersecting.is_empty()
    }

    /// Structures that appeared or disappeared relative to `previous`,
    /// ignoring moves between the contained and intersecting sets.
    pub fn delta_from(&self, previous: &Classification) -> ClassifyDelta {
        let now: BTreeSet<_> = self.contained.union(&self.intersecting).copied().collect();
        let before: BTreeSet<_> = previous
            .contained
            .union(&previous.intersecting)
            .copied()
            .collect();
        ClassifyDelta {
            added: now.difference(&before).copied().collect(),
            removed: before.difference(&now).copied().collect(),
        }
    }
}

/// Partition `views`. The yard's own structure, closed structures, ghosts
/// and finished projections are skipped.
pub fn classify(
    yard_box: &OrientedBox,
    yard_structure: StructureId,
    views: &[StructureView],
) -> Classification {
    let mut result = Classification::default();
    for view in views {
        if view.id == yard_structure || !view.is_candidate() {
            continue;
        }
        match Placement::of(yard_box, &view.bounds) {
            Placement::Contained => {
                result.contained.insert(view.id);
            }
            Placement::Intersecting => {
                result.intersecting.insert(view.id);
            }
            Placement::Outside => {}
        }
    }
    result
}

/// Query the provider around the yard box and classify what it returns.
/// Structures that vanish between the query and the lookup are skipped.
pub fn classify_nearby(
    provider: &dyn StructureProvider,
    yard_box: &OrientedBox,
    yard_structure: StructureId,
) -> Classification {
    let views: Vec<StructureView> = provider
        .structures_in(yard_box)
        .into_iter()
        .filter_map(|id| provider.structure(id))
        .collect();
    classify(yard_box, yard_structure, &views)
}
