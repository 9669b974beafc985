//! Turning terminal decisions into OSM change operations.
//!
//! The builder consumes decisions by value and emits one [`ChangeOp`] per
//! decision, except rejected ones which are listed as discarded. Operations
//! that touch an existing OSM feature are checked against the spatial index:
//! the feature must still exist with the generation seen at match time.

use std::collections::HashMap;

use log::info;
#[cfg(feature = "serde")]
use serde::Serialize;
use thiserror::Error;

use crate::{
    Decision, DecisionKind, Feature, FeatureGeometry, FeatureId, GeometryPolicy,
    ManualResolution, OsmVersion, SpatialIndex, Tags,
};

/// Kind of change applied to OSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(rename_all = "camelCase")
)]
pub enum ChangeKind {
    /// Add a new feature.
    Create,
    /// Update an existing feature.
    Modify,
    /// Remove an existing feature.
    Delete,
}

impl ChangeKind {
    /// Lowercase name used in exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

/// A single operation ready for changeset upload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ChangeOp {
    /// What to do.
    pub kind: ChangeKind,
    /// Existing OSM feature, for Modify and Delete.
    pub target: Option<FeatureId>,
    /// Version of the target the change was computed against.
    pub base_version: Option<OsmVersion>,
    /// Incoming feature the change came from.
    pub source: FeatureId,
    /// Final tags.
    pub tags: Tags,
    /// Final geometry.
    pub geometry: FeatureGeometry,
}

/// Why a decision produced no operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(rename_all = "camelCase")
)]
pub enum DiscardReason {
    /// A reviewer rejected the incoming feature.
    Rejected,
}

/// A decision that produced no operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Discarded {
    /// Incoming feature id.
    pub incoming: FeatureId,
    /// Why it was dropped.
    pub reason: DiscardReason,
}

/// Output of [`ChangeBuilder::build`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ChangeSet {
    /// Operations ordered by source incoming id.
    pub ops: Vec<ChangeOp>,
    /// Decisions dropped without an operation.
    pub discarded: Vec<Discarded>,
}

impl ChangeSet {
    /// Number of operations of `kind`.
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.ops.iter().filter(|op| op.kind == kind).count()
    }
}

/// A decision whose OSM target changed after matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleReference {
    /// Incoming feature id.
    pub incoming: FeatureId,
    /// Referenced OSM feature.
    pub target: FeatureId,
    /// Generation observed at match time.
    pub expected_generation: u64,
    /// Current generation, or `None` if the feature was removed.
    pub current_generation: Option<u64>,
}

/// Errors raised by [`ChangeBuilder::build`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChangeError {
    /// One or more targets were updated or removed after matching.
    #[error("{} decision(s) reference OSM features that changed after matching", stale.len())]
    StaleReference {
        /// Every stale reference found.
        stale: Vec<StaleReference>,
    },
    /// A decision was still waiting for review.
    #[error("incoming feature {id} has not been resolved")]
    Unresolved {
        /// Incoming id.
        id: FeatureId,
    },
    /// A merge or deletion decision carried no target.
    #[error("{kind} decision for incoming feature {id} has no OSM target")]
    MissingTarget {
        /// Incoming id.
        id: FeatureId,
        /// Kind of the offending decision.
        kind: DecisionKind,
    },
    /// Two decisions referenced the same OSM feature.
    #[error("OSM feature {target} is referenced by incoming features {first} and {second}")]
    DuplicateTarget {
        /// Shared OSM feature.
        target: FeatureId,
        /// First incoming feature.
        first: FeatureId,
        /// Second incoming feature.
        second: FeatureId,
    },
}

/// Builds change sets against the current spatial index.
#[derive(Debug, Clone, Copy)]
pub struct ChangeBuilder<'a> {
    index: &'a SpatialIndex,
    policy: GeometryPolicy,
}

impl<'a> ChangeBuilder<'a> {
    /// Create a builder reading OSM state from `index`.
    #[must_use]
    pub const fn new(index: &'a SpatialIndex, policy: GeometryPolicy) -> Self {
        Self { index, policy }
    }

    /// Convert terminal decisions into a change set.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeError::Unresolved`] for pending decisions,
    /// [`ChangeError::DuplicateTarget`] when two decisions share a target and
    /// [`ChangeError::StaleReference`] listing every outdated target.
    pub fn build(&self, mut decisions: Vec<Decision>) -> Result<ChangeSet, ChangeError> {
        decisions.sort_by_key(Decision::incoming_id);
        let mut changes = ChangeSet::default();
        let mut stale = Vec::new();
        let mut targets: HashMap<FeatureId, FeatureId> = HashMap::new();

        for decision in decisions {
            let id = decision.incoming_id();
            let kind = decision.kind();
            let operation = match kind {
                DecisionKind::NeedsReview => return Err(ChangeError::Unresolved { id }),
                DecisionKind::Rejected => {
                    changes.discarded.push(Discarded {
                        incoming: id,
                        reason: DiscardReason::Rejected,
                    });
                    continue;
                }
                DecisionKind::AutoCreate
                | DecisionKind::ManualResolved(ManualResolution::CreateNew) => {
                    changes.ops.push(create_op(&decision));
                    continue;
                }
                DecisionKind::AutoMerge
                | DecisionKind::ManualResolved(ManualResolution::Merge) => ChangeKind::Modify,
                DecisionKind::ManualResolved(ManualResolution::Delete) => ChangeKind::Delete,
            };

            let target = decision
                .target()
                .ok_or(ChangeError::MissingTarget { id, kind })?;
            if let Some(first) = targets.insert(target.id, id) {
                return Err(ChangeError::DuplicateTarget {
                    target: target.id,
                    first,
                    second: id,
                });
            }
            let current_generation = self.index.generation(target.id);
            let osm = self
                .index
                .get(target.id)
                .filter(|_| current_generation == Some(target.generation));
            let Some(osm) = osm else {
                stale.push(StaleReference {
                    incoming: id,
                    target: target.id,
                    expected_generation: target.generation,
                    current_generation,
                });
                continue;
            };
            changes.ops.push(match operation {
                ChangeKind::Delete => delete_op(&decision, osm),
                ChangeKind::Create | ChangeKind::Modify => self.modify_op(&decision, osm),
            });
        }

        if !stale.is_empty() {
            return Err(ChangeError::StaleReference { stale });
        }
        info!(
            "built {} change operations ({} create, {} modify, {} delete), {} discarded",
            changes.ops.len(),
            changes.count(ChangeKind::Create),
            changes.count(ChangeKind::Modify),
            changes.count(ChangeKind::Delete),
            changes.discarded.len()
        );
        Ok(changes)
    }

    fn modify_op(&self, decision: &Decision, osm: &Feature) -> ChangeOp {
        let source = decision.incoming_id();
        let overrides = decision.overrides().clone();
        let tags = overrides.tags.unwrap_or_else(|| {
            let mut merged = osm.tags().clone();
            merged.extend(
                decision
                    .incoming()
                    .tags()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone())),
            );
            merged
        });
        let geometry = overrides.geometry.unwrap_or_else(|| match self.policy {
            GeometryPolicy::KeepOsm => osm.geometry().clone(),
            GeometryPolicy::PreferIncoming => decision.incoming().geometry().clone(),
        });
        ChangeOp {
            kind: ChangeKind::Modify,
            target: Some(osm.id()),
            base_version: osm.osm_version(),
            source,
            tags,
            geometry,
        }
    }
}

fn create_op(decision: &Decision) -> ChangeOp {
    let source = decision.incoming_id();
    let overrides = decision.overrides().clone();
    ChangeOp {
        kind: ChangeKind::Create,
        target: None,
        base_version: None,
        source,
        tags: overrides
            .tags
            .unwrap_or_else(|| decision.incoming().tags().clone()),
        geometry: overrides
            .geometry
            .unwrap_or_else(|| decision.incoming().geometry().clone()),
    }
}

fn delete_op(decision: &Decision, osm: &Feature) -> ChangeOp {
    ChangeOp {
        kind: ChangeKind::Delete,
        target: Some(osm.id()),
        base_version: osm.osm_version(),
        source: decision.incoming_id(),
        tags: osm.tags().clone(),
        geometry: osm.geometry().clone(),
    }
}
