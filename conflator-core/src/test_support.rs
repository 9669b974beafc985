//! Fixture builders for unit tests and, behind the `test-support` feature,
//! for tests in dependent crates.
//!
//! The helpers panic on invalid input and are meant for fixtures only.

#![expect(
    clippy::expect_used,
    reason = "fixture builders fail loudly on invalid literals"
)]

use crate::{
    Crs, Decision, DecisionKind, Feature, FeatureGeometry, FeatureId, MatchCandidate, MatchScore,
    ResolverRule, Tags,
};

/// Build a tag map from literal pairs.
#[must_use]
pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

/// An OSM point feature.
///
/// # Panics
///
/// Panics if the coordinates are not finite.
#[must_use]
pub fn osm_point(id: u64, crs: Crs, x: f64, y: f64, pairs: &[(&str, &str)]) -> Feature {
    let geometry = FeatureGeometry::point(crs, x, y).expect("finite fixture coordinates");
    Feature::osm(FeatureId::new(id), geometry, tags(pairs))
}

/// An incoming point feature.
///
/// # Panics
///
/// Panics if the coordinates are not finite.
#[must_use]
pub fn incoming_point(id: u64, crs: Crs, x: f64, y: f64, pairs: &[(&str, &str)]) -> Feature {
    let geometry = FeatureGeometry::point(crs, x, y).expect("finite fixture coordinates");
    Feature::incoming(FeatureId::new(id), geometry, tags(pairs))
}

/// A candidate whose component scores all equal `total`, at generation 0.
#[must_use]
pub fn candidate(incoming: u64, osm: u64, total: f64) -> MatchCandidate {
    MatchCandidate {
        incoming: FeatureId::new(incoming),
        osm: FeatureId::new(osm),
        score: MatchScore {
            geometry: total,
            attribute: total,
            total,
        },
        distance_m: 0.0,
        rank: 0,
        generation: 0,
    }
}

/// A NeedsReview decision for an incoming WGS84 point at the origin.
#[must_use]
pub fn review_decision(incoming: u64, candidates: Vec<MatchCandidate>) -> Decision {
    Decision::new(
        DecisionKind::NeedsReview,
        incoming_point(incoming, Crs::Wgs84, 0.0, 0.0, &[]),
        crate::rank_candidates(candidates),
        ResolverRule::BelowThreshold,
        "queued for review".to_owned(),
    )
}
