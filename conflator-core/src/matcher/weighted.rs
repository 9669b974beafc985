//! Default matcher blending distance and tag similarity.

use std::f64::consts::PI;

use crate::{
    ConfigError, ConflationConfig, Feature, MatchCandidate, MatchError, MatchScore, Matcher,
    SpatialCandidate, attribute_score, rank_candidates,
};

/// Raised-cosine taper from 1 at distance 0 down to 0 at `radius_m`.
///
/// Distances at or beyond the radius, and non-finite input, score 0.
///
/// # Examples
///
/// ```
/// use conflator_core::geometry_score;
///
/// assert_eq!(geometry_score(0.0, 50.0), 1.0);
/// assert!((geometry_score(25.0, 50.0) - 0.5).abs() < 1e-12);
/// assert_eq!(geometry_score(50.0, 50.0), 0.0);
/// ```
#[expect(clippy::float_arithmetic, reason = "cosine taper over distance")]
#[must_use]
pub fn geometry_score(distance_m: f64, radius_m: f64) -> f64 {
    if distance_m.is_finite() && radius_m > 0.0 && distance_m < radius_m {
        0.5 * (1.0 + (PI * distance_m.max(0.0) / radius_m).cos())
    } else {
        0.0
    }
}

/// Matcher scoring `g * geometry + (1 - g) * attribute`.
///
/// # Examples
///
/// ```
/// use conflator_core::{ConflationConfig, WeightedMatcher};
///
/// let matcher = WeightedMatcher::new(ConflationConfig::default()).expect("valid config");
/// assert_eq!(matcher.config().geometry_weight, 0.5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedMatcher {
    config: ConflationConfig,
}

impl WeightedMatcher {
    /// Build a matcher from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is out of range.
    pub fn new(config: ConflationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ConflationConfig {
        &self.config
    }

    #[expect(clippy::float_arithmetic, reason = "weighted blend of two scores")]
    fn score(&self, incoming: &Feature, candidate: &SpatialCandidate<'_>) -> MatchScore {
        let geometry = geometry_score(candidate.distance_m, self.config.max_match_radius);
        let attribute = attribute_score(incoming.tags(), candidate.feature.tags(), &self.config);
        let weight = self.config.geometry_weight;
        let blended = weight * geometry + (1.0 - weight) * attribute;
        let total = if blended.is_finite() {
            blended.clamp(0.0, 1.0)
        } else {
            blended
        };
        MatchScore {
            geometry,
            attribute,
            total,
        }
    }
}

impl Matcher for WeightedMatcher {
    fn match_feature(
        &self,
        incoming: &Feature,
        candidates: &[SpatialCandidate<'_>],
    ) -> Result<Vec<MatchCandidate>, MatchError> {
        let incoming_crs = incoming.geometry().crs();
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let osm_crs = candidate.feature.geometry().crs();
            if osm_crs != incoming_crs {
                return Err(MatchError::CrsMismatch {
                    incoming: incoming.id(),
                    incoming_crs,
                    osm: candidate.id(),
                    osm_crs,
                });
            }
            let score = self.score(incoming, candidate);
            if !score.total.is_finite() {
                return Err(MatchError::NonFiniteScore {
                    incoming: incoming.id(),
                    osm: candidate.id(),
                });
            }
            if score.geometry <= 0.0 {
                continue;
            }
            scored.push(MatchCandidate {
                incoming: incoming.id(),
                osm: candidate.id(),
                score,
                distance_m: candidate.distance_m,
                rank: 0,
                generation: candidate.generation,
            });
        }
        Ok(rank_candidates(scored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{incoming_point, osm_point};
    use crate::{Crs, SpatialIndex};
    use rstest::{fixture, rstest};

    #[fixture]
    fn matcher() -> WeightedMatcher {
        WeightedMatcher::new(ConflationConfig::default()).expect("default config")
    }

    #[rstest]
    fn prefers_agreeing_tags_over_proximity(matcher: WeightedMatcher) {
        let mut index = SpatialIndex::new();
        index
            .build(vec![
                osm_point(1, Crs::WebMercator, 2.0, 0.0, &[("name", "Launderette")]),
                osm_point(2, Crs::WebMercator, 8.0, 0.0, &[("name", "Corner Cafe")]),
            ])
            .expect("build");
        let cafe = incoming_point(100, Crs::WebMercator, 0.0, 0.0, &[("name", "Corner Café")]);
        let nearby = index.query(cafe.geometry(), 50.0).expect("query");
        let ranked = matcher.match_feature(&cafe, &nearby).expect("match");
        assert_eq!(ranked.first().map(|c| c.osm.get()), Some(2));
        assert!(ranked.iter().all(|c| (0.0..=1.0).contains(&c.score.total)));
    }

    #[rstest]
    fn drops_candidates_at_the_radius(matcher: WeightedMatcher) {
        let mut index = SpatialIndex::new();
        index
            .build(vec![osm_point(1, Crs::WebMercator, 50.0, 0.0, &[])])
            .expect("build");
        let lonely = incoming_point(7, Crs::WebMercator, 0.0, 0.0, &[]);
        let nearby = index.query(lonely.geometry(), 50.0).expect("query");
        assert_eq!(nearby.len(), 1);
        assert!(matcher.match_feature(&lonely, &nearby).expect("match").is_empty());
    }

    #[rstest]
    fn reports_crs_mismatch(matcher: WeightedMatcher) {
        let mut index = SpatialIndex::new();
        index
            .build(vec![osm_point(1, Crs::WebMercator, 1.0, 0.0, &[])])
            .expect("build");
        let nearby = index
            .query(
                osm_point(9, Crs::WebMercator, 0.0, 0.0, &[]).geometry(),
                10.0,
            )
            .expect("query");
        let foreign = incoming_point(7, Crs::Wgs84, 0.0, 0.0, &[]);
        assert!(matches!(
            matcher.match_feature(&foreign, &nearby),
            Err(MatchError::CrsMismatch { .. })
        ));
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(50.0, 0.0)]
    #[case(75.0, 0.0)]
    #[case(f64::NAN, 0.0)]
    fn taper_endpoints(#[case] distance: f64, #[case] expected: f64) {
        assert_eq!(geometry_score(distance, 50.0), expected);
    }
}
