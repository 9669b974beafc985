//! Manual conflation queue.
//!
//! Decisions the resolver could not settle wait here until a reviewer picks
//! an outcome. The queue owns the set of OSM features already claimed by a
//! merge or deletion, so two incoming features can never be merged into the
//! same OSM feature. All operations take `&self`; mutation is serialised by an
//! internal mutex so the queue can be shared with a UI thread.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use thiserror::Error;

use crate::{
    AuditSource, Crs, Decision, DecisionKind, Feature, FeatureId, ManualResolution,
    MatchCandidate, MatchedTarget, Overrides, ReviewAction,
};

/// Errors raised by [`ReviewQueue`] operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReviewError {
    /// No decision exists for the incoming feature.
    #[error("no review item for incoming feature {id}")]
    NotFound {
        /// Requested incoming id.
        id: FeatureId,
    },
    /// The decision is already terminal.
    #[error("incoming feature {id} is already resolved as {kind}")]
    State {
        /// Incoming id.
        id: FeatureId,
        /// Current kind of the decision.
        kind: DecisionKind,
    },
    /// The chosen OSM feature is not among the decision's candidates.
    #[error("OSM feature {chosen} is not a candidate for incoming feature {id}")]
    UnknownCandidate {
        /// Incoming id.
        id: FeatureId,
        /// Requested OSM feature.
        chosen: FeatureId,
    },
    /// Another decision already merges into or deletes the OSM feature.
    #[error("OSM feature {target} is already claimed by incoming feature {claimed_by}")]
    TargetClaimed {
        /// Requested OSM feature.
        target: FeatureId,
        /// Incoming feature holding the claim.
        claimed_by: FeatureId,
    },
    /// An override geometry used a different reference system.
    #[error("override for incoming feature {id} uses {found} but the feature uses {expected}")]
    CrsMismatch {
        /// Incoming id.
        id: FeatureId,
        /// Reference system of the incoming feature.
        expected: Crs,
        /// Reference system of the override.
        found: Crs,
    },
    /// A decision for the incoming feature is already queued.
    #[error("incoming feature {id} is already queued")]
    Duplicate {
        /// Incoming id.
        id: FeatureId,
    },
}

/// A pending item as presented to a reviewer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReview {
    /// The incoming feature.
    pub incoming: Feature,
    /// Ranked candidates, best first.
    pub candidates: Vec<MatchCandidate>,
    /// Matching error, if the item is here because matching failed.
    pub error: Option<String>,
    /// Overrides recorded so far.
    pub overrides: Overrides,
}

impl PendingReview {
    fn from_decision(decision: &Decision) -> Self {
        Self {
            incoming: decision.incoming().clone(),
            candidates: decision.candidates().to_vec(),
            error: decision.error().map(ToOwned::to_owned),
            overrides: decision.overrides().clone(),
        }
    }

    /// Identifier of the incoming feature.
    #[must_use]
    pub const fn id(&self) -> FeatureId {
        self.incoming.id()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    decisions: BTreeMap<FeatureId, Decision>,
    claimed: HashMap<FeatureId, FeatureId>,
    drained: HashMap<FeatureId, DecisionKind>,
}

impl QueueState {
    fn pending_mut(&mut self, id: FeatureId) -> Result<&mut Decision, ReviewError> {
        if let Some(kind) = self.drained.get(&id) {
            return Err(ReviewError::State { id, kind: *kind });
        }
        let decision = self
            .decisions
            .get_mut(&id)
            .ok_or(ReviewError::NotFound { id })?;
        if decision.kind().is_terminal() {
            return Err(ReviewError::State {
                id,
                kind: decision.kind(),
            });
        }
        Ok(decision)
    }

    fn bind(
        &mut self,
        id: FeatureId,
        chosen: FeatureId,
        resolution: ManualResolution,
        action: ReviewAction,
    ) -> Result<(), ReviewError> {
        if let Some(claimed_by) = self.claimed.get(&chosen).copied()
            && claimed_by != id
        {
            // Report state errors before claim conflicts.
            self.pending_mut(id)?;
            return Err(ReviewError::TargetClaimed {
                target: chosen,
                claimed_by,
            });
        }
        let decision = self.pending_mut(id)?;
        let generation = decision
            .candidate(chosen)
            .map(|candidate| candidate.generation)
            .ok_or(ReviewError::UnknownCandidate { id, chosen })?;
        decision.set_target(Some(MatchedTarget {
            id: chosen,
            generation,
        }));
        let kind = DecisionKind::ManualResolved(resolution);
        decision.transition(
            kind,
            AuditSource::Reviewer(action),
            format!("reviewer chose OSM feature {chosen}"),
        );
        self.claimed.insert(chosen, id);
        debug!("incoming feature {id} resolved as {kind} against {chosen}");
        Ok(())
    }

    fn settle(
        &mut self,
        id: FeatureId,
        kind: DecisionKind,
        action: ReviewAction,
        note: &str,
    ) -> Result<(), ReviewError> {
        let decision = self.pending_mut(id)?;
        decision.transition(kind, AuditSource::Reviewer(action), note.to_owned());
        debug!("incoming feature {id} resolved as {kind}");
        Ok(())
    }
}

/// Thread-safe queue of decisions awaiting a reviewer.
///
/// # Examples
///
/// ```
/// use conflator_core::ReviewQueue;
///
/// let queue = ReviewQueue::new();
/// assert!(queue.is_empty());
/// assert!(queue.pending().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct ReviewQueue {
    inner: Mutex<QueueState>,
}

impl ReviewQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `target` as claimed by the `incoming` feature.
    ///
    /// The session seeds the queue with the targets of automatic merges.
    pub fn claim(&self, target: FeatureId, incoming: FeatureId) {
        self.lock().claimed.insert(target, incoming);
    }

    /// Incoming feature holding a claim on `target`, if any.
    #[must_use]
    pub fn claimed_by(&self, target: FeatureId) -> Option<FeatureId> {
        self.lock().claimed.get(&target).copied()
    }

    /// Add a NeedsReview decision.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::State`] for terminal decisions and
    /// [`ReviewError::Duplicate`] if the incoming id is already queued.
    pub fn enqueue(&self, decision: Decision) -> Result<(), ReviewError> {
        let id = decision.incoming_id();
        if decision.kind().is_terminal() {
            return Err(ReviewError::State {
                id,
                kind: decision.kind(),
            });
        }
        let mut state = self.lock();
        if state.decisions.contains_key(&id) || state.drained.contains_key(&id) {
            return Err(ReviewError::Duplicate { id });
        }
        state.decisions.insert(id, decision);
        Ok(())
    }

    /// Pending items ordered by incoming id.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingReview> {
        self.lock()
            .decisions
            .values()
            .filter(|decision| !decision.kind().is_terminal())
            .map(PendingReview::from_decision)
            .collect()
    }

    /// Merge the incoming feature into the chosen candidate.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::NotFound`], [`ReviewError::State`],
    /// [`ReviewError::UnknownCandidate`] or [`ReviewError::TargetClaimed`].
    pub fn accept(&self, id: FeatureId, chosen: FeatureId) -> Result<(), ReviewError> {
        self.lock()
            .bind(id, chosen, ManualResolution::Merge, ReviewAction::Accept)
    }

    /// Discard the incoming feature.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::NotFound`] or [`ReviewError::State`].
    pub fn reject(&self, id: FeatureId) -> Result<(), ReviewError> {
        self.lock().settle(
            id,
            DecisionKind::Rejected,
            ReviewAction::Reject,
            "reviewer rejected the incoming feature",
        )
    }

    /// Add the incoming feature as a new OSM feature.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::NotFound`] or [`ReviewError::State`].
    pub fn create_new(&self, id: FeatureId) -> Result<(), ReviewError> {
        self.lock().settle(
            id,
            DecisionKind::ManualResolved(ManualResolution::CreateNew),
            ReviewAction::CreateNew,
            "reviewer chose to create a new feature",
        )
    }

    /// Delete the chosen candidate from OSM.
    ///
    /// # Errors
    ///
    /// Same as [`ReviewQueue::accept`].
    pub fn delete_existing(&self, id: FeatureId, chosen: FeatureId) -> Result<(), ReviewError> {
        self.lock().bind(
            id,
            chosen,
            ManualResolution::Delete,
            ReviewAction::DeleteExisting,
        )
    }

    /// Record tag or geometry overrides on a pending decision.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::NotFound`], [`ReviewError::State`] or
    /// [`ReviewError::CrsMismatch`].
    pub fn edit(&self, id: FeatureId, overrides: Overrides) -> Result<(), ReviewError> {
        let mut state = self.lock();
        let decision = state.pending_mut(id)?;
        let expected = decision.incoming().geometry().crs();
        if let Some(geometry) = &overrides.geometry
            && geometry.crs() != expected
        {
            return Err(ReviewError::CrsMismatch {
                id,
                expected,
                found: geometry.crs(),
            });
        }
        let note = match (&overrides.tags, &overrides.geometry) {
            (Some(_), Some(_)) => "reviewer overrode tags and geometry",
            (Some(_), None) => "reviewer overrode tags",
            (None, Some(_)) => "reviewer overrode geometry",
            (None, None) => "reviewer cleared overrides",
        };
        decision.set_overrides(overrides);
        decision.annotate(AuditSource::Reviewer(ReviewAction::Edit), note.to_owned());
        Ok(())
    }

    /// Remove and return every terminal decision, ordered by incoming id.
    #[must_use]
    pub fn take_resolved(&self) -> Vec<Decision> {
        let mut state = self.lock();
        let resolved: Vec<FeatureId> = state
            .decisions
            .iter()
            .filter(|(_, decision)| decision.kind().is_terminal())
            .map(|(id, _)| *id)
            .collect();
        let mut taken = Vec::with_capacity(resolved.len());
        for id in resolved {
            if let Some(decision) = state.decisions.remove(&id) {
                state.drained.insert(id, decision.kind());
                taken.push(decision);
            }
        }
        taken
    }

    /// Copies of the terminal decisions still held by the queue.
    #[must_use]
    pub fn resolved(&self) -> Vec<Decision> {
        self.lock()
            .decisions
            .values()
            .filter(|decision| decision.kind().is_terminal())
            .cloned()
            .collect()
    }

    /// Whether no decision is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    /// Number of decisions awaiting a reviewer.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock()
            .decisions
            .values()
            .filter(|decision| !decision.kind().is_terminal())
            .count()
    }

    /// Number of terminal decisions not yet taken.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.lock()
            .decisions
            .values()
            .filter(|decision| decision.kind().is_terminal())
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
