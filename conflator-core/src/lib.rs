//! Conflation engine for OpenStreetMap imports.
//!
//! Given an OSM snapshot and an incoming dataset, the engine decides which
//! incoming features merge into existing OSM features, which are new, and
//! which need a human decision, then emits create/modify/delete operations.
//!
//! The pipeline runs Feature Model → [`SpatialIndex`] → [`Matcher`] →
//! [`AutoResolver`] → ([`ReviewQueue`]) → [`ChangeBuilder`].
//! [`ConflationSession`] wires the stages together. This crate performs no
//! I/O; loaders and writers live in `conflator-data`.

#![forbid(unsafe_code)]

mod changes;
mod config;
mod decision;
mod feature;
mod index;
mod matcher;
mod resolver;
mod review;
mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use changes::{
    ChangeBuilder, ChangeError, ChangeKind, ChangeOp, ChangeSet, DiscardReason, Discarded,
    StaleReference,
};
pub use config::{ConfigError, ConflationConfig, GeometryPolicy};
pub use decision::{
    AuditEntry, AuditSource, Decision, DecisionKind, ManualResolution, MatchedTarget, Overrides,
    ResolverRule, ReviewAction,
};
pub use feature::{
    Crs, Feature, FeatureGeometry, FeatureId, FeatureIdError, GeometryError, OsmElementKind,
    OsmVersion, Provenance, Shape, Tags,
};
pub use index::{IndexError, SpatialCandidate, SpatialIndex};
pub use matcher::{
    MatchCandidate, MatchError, MatchScore, Matcher, WeightedMatcher, attribute_score,
    geometry_score, normalise_value, rank_candidates, value_similarity,
};
pub use resolver::{AutoResolver, MatchOutcome, Resolution, SCORE_EPSILON, Verdict};
pub use review::{PendingReview, ReviewError, ReviewQueue};
pub use session::{ConflationSession, RunSummary, SessionError};
