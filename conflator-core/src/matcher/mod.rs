//! Scoring incoming features against nearby OSM features.
//!
//! A [`Matcher`] turns the spatial candidates of one incoming feature into a
//! ranked list of [`MatchCandidate`] values. The default implementation,
//! [`WeightedMatcher`], blends a distance taper with tag similarity.

#[cfg(feature = "serde")]
use serde::Serialize;
use thiserror::Error;

use crate::{Crs, Feature, FeatureId, IndexError, SpatialCandidate};

mod similarity;
mod weighted;

pub use similarity::{attribute_score, normalise_value, value_similarity};
pub use weighted::{WeightedMatcher, geometry_score};

/// Component scores of one candidate, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MatchScore {
    /// Distance-based score.
    pub geometry: f64,
    /// Tag-based score.
    pub attribute: f64,
    /// Weighted blend used for ranking.
    pub total: f64,
}

/// A scored pairing of one incoming feature with one OSM feature.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MatchCandidate {
    /// Incoming feature being matched.
    pub incoming: FeatureId,
    /// OSM feature it was compared against.
    pub osm: FeatureId,
    /// Component and total scores.
    pub score: MatchScore,
    /// Metric distance between the two geometries.
    pub distance_m: f64,
    /// Position among the incoming feature's candidates, 0 being best.
    pub rank: usize,
    /// Generation of the OSM feature when it was scored.
    pub generation: u64,
}

/// Errors raised while matching a single incoming feature.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MatchError {
    /// The candidate was loaded in a different reference system.
    #[error("incoming feature {incoming} uses {incoming_crs} but candidate {osm} uses {osm_crs}")]
    CrsMismatch {
        /// Incoming feature id.
        incoming: FeatureId,
        /// Reference system of the incoming feature.
        incoming_crs: Crs,
        /// Candidate OSM feature id.
        osm: FeatureId,
        /// Reference system of the candidate.
        osm_crs: Crs,
    },
    /// A score evaluated to NaN or infinity.
    #[error("score for incoming feature {incoming} against {osm} is not finite")]
    NonFiniteScore {
        /// Incoming feature id.
        incoming: FeatureId,
        /// Candidate OSM feature id.
        osm: FeatureId,
    },
    /// The candidate search failed.
    #[error("candidate search failed: {0}")]
    Index(#[from] IndexError),
}

/// Scores candidates for one incoming feature.
///
/// Implementations must be thread-safe; the session scores incoming features
/// in parallel against a shared index.
pub trait Matcher: Send + Sync {
    /// Score `candidates` for `incoming`, best first.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError`] when a candidate cannot be scored.
    fn match_feature(
        &self,
        incoming: &Feature,
        candidates: &[SpatialCandidate<'_>],
    ) -> Result<Vec<MatchCandidate>, MatchError>;
}

/// Sort candidates by descending total, ties by smaller OSM id, and assign
/// ranks in that order.
#[must_use]
pub fn rank_candidates(mut candidates: Vec<MatchCandidate>) -> Vec<MatchCandidate> {
    candidates.sort_by(|a, b| {
        b.score
            .total
            .total_cmp(&a.score.total)
            .then_with(|| a.osm.cmp(&b.osm))
    });
    for (rank, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = rank;
    }
    candidates
}
