//! Conflation decisions and their audit trail.
//!
//! A [`Decision`] records what should happen to one incoming feature. It is
//! produced by the resolver or the review queue and consumed, by value, by the
//! change builder.

use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{Feature, FeatureGeometry, FeatureId, MatchCandidate, Tags};

/// Outcome chosen by a reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(rename_all = "camelCase")
)]
pub enum ManualResolution {
    /// Merge into the chosen OSM feature.
    Merge,
    /// Add as a new OSM feature.
    CreateNew,
    /// Delete the chosen OSM feature.
    Delete,
}

/// State of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(rename_all = "camelCase")
)]
pub enum DecisionKind {
    /// Confident automatic merge.
    AutoMerge,
    /// No candidate nearby; create automatically.
    AutoCreate,
    /// Waiting for a reviewer.
    NeedsReview,
    /// Discarded by a reviewer.
    Rejected,
    /// Resolved by a reviewer.
    ManualResolved(ManualResolution),
}

impl DecisionKind {
    /// Every kind except [`DecisionKind::NeedsReview`] is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::NeedsReview)
    }

    /// Whether the decision binds an OSM feature exclusively.
    #[must_use]
    pub const fn claims_target(self) -> bool {
        matches!(
            self,
            Self::AutoMerge
                | Self::ManualResolved(ManualResolution::Merge | ManualResolution::Delete)
        )
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AutoMerge => "auto-merge",
            Self::AutoCreate => "auto-create",
            Self::NeedsReview => "needs-review",
            Self::Rejected => "rejected",
            Self::ManualResolved(ManualResolution::Merge) => "manual-merge",
            Self::ManualResolved(ManualResolution::CreateNew) => "manual-create",
            Self::ManualResolved(ManualResolution::Delete) => "manual-delete",
        })
    }
}

/// Resolver rule behind an automatic classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(rename_all = "camelCase")
)]
pub enum ResolverRule {
    /// No candidate within the match radius.
    NoCandidates,
    /// Top score cleared the threshold with no close runner-up.
    ConfidentMatch,
    /// Top score stayed below the merge threshold.
    BelowThreshold,
    /// A runner-up scored within the ambiguity margin.
    AmbiguousCandidates,
    /// Another incoming feature auto-merged into the same target.
    ContestedTarget,
    /// Matching raised an error.
    MatchFailed,
}

/// Reviewer action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(rename_all = "camelCase")
)]
pub enum ReviewAction {
    /// Accepted a candidate for merging.
    Accept,
    /// Rejected the incoming feature.
    Reject,
    /// Chose to create a new OSM feature.
    CreateNew,
    /// Deleted an OSM candidate.
    DeleteExisting,
    /// Recorded tag or geometry overrides.
    Edit,
}

/// Origin of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(rename_all = "camelCase")
)]
pub enum AuditSource {
    /// Automatic resolver rule.
    Rule(ResolverRule),
    /// Reviewer action.
    Reviewer(ReviewAction),
}

/// One step in a decision's history.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct AuditEntry {
    /// What produced the step.
    pub source: AuditSource,
    /// Kind of the decision after the step.
    pub kind: DecisionKind,
    /// Human-readable detail.
    pub note: String,
}

/// Reviewer replacements for the final tags or geometry.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Overrides {
    /// Replacement tag set.
    pub tags: Option<Tags>,
    /// Replacement geometry.
    pub geometry: Option<FeatureGeometry>,
}

impl Overrides {
    /// Whether neither tags nor geometry are overridden.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tags.is_none() && self.geometry.is_none()
    }
}

/// OSM feature a decision refers to, with the generation it was matched at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MatchedTarget {
    /// OSM feature id.
    pub id: FeatureId,
    /// Generation observed when the feature was scored.
    pub generation: u64,
}

/// What should happen to one incoming feature.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Decision {
    kind: DecisionKind,
    incoming: Feature,
    target: Option<MatchedTarget>,
    candidates: Vec<MatchCandidate>,
    error: Option<String>,
    overrides: Overrides,
    audit: Vec<AuditEntry>,
}

impl Decision {
    /// Start a decision with its first audit entry.
    pub(crate) fn new(
        kind: DecisionKind,
        incoming: Feature,
        candidates: Vec<MatchCandidate>,
        rule: ResolverRule,
        note: String,
    ) -> Self {
        Self {
            kind,
            incoming,
            target: None,
            candidates,
            error: None,
            overrides: Overrides::default(),
            audit: vec![AuditEntry {
                source: AuditSource::Rule(rule),
                kind,
                note,
            }],
        }
    }

    pub(crate) fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub(crate) fn set_target(&mut self, target: Option<MatchedTarget>) {
        self.target = target;
    }

    pub(crate) fn set_overrides(&mut self, overrides: Overrides) {
        self.overrides = overrides;
    }

    /// Move to `kind` and append an audit entry.
    pub(crate) fn transition(&mut self, kind: DecisionKind, source: AuditSource, note: String) {
        self.kind = kind;
        self.audit.push(AuditEntry { source, kind, note });
    }

    /// Append an audit entry without changing kind.
    pub(crate) fn annotate(&mut self, source: AuditSource, note: String) {
        self.audit.push(AuditEntry {
            source,
            kind: self.kind,
            note,
        });
    }

    /// Current state.
    #[must_use]
    pub const fn kind(&self) -> DecisionKind {
        self.kind
    }

    /// The incoming feature being decided.
    #[must_use]
    pub const fn incoming(&self) -> &Feature {
        &self.incoming
    }

    /// Identifier of the incoming feature.
    #[must_use]
    pub const fn incoming_id(&self) -> FeatureId {
        self.incoming.id()
    }

    /// Matched OSM feature, for merges and deletions.
    #[must_use]
    pub const fn target(&self) -> Option<MatchedTarget> {
        self.target
    }

    /// Ranked candidates, best first.
    #[must_use]
    pub fn candidates(&self) -> &[MatchCandidate] {
        &self.candidates
    }

    /// Candidate for a specific OSM feature.
    #[must_use]
    pub fn candidate(&self, osm: FeatureId) -> Option<&MatchCandidate> {
        self.candidates.iter().find(|candidate| candidate.osm == osm)
    }

    /// Error raised while matching, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Reviewer overrides.
    #[must_use]
    pub const fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// History of the decision, oldest first.
    #[must_use]
    pub fn audit(&self) -> &[AuditEntry] {
        &self.audit
    }
}
