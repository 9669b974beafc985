//! Tag value similarity.

use crate::{ConflationConfig, Tags};

/// Trim and lowercase a tag value for comparison.
#[must_use]
pub fn normalise_value(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Similarity of two tag values in `[0, 1]`.
///
/// Equal values after normalisation score 1; otherwise the Jaro-Winkler
/// similarity of the normalised strings is used.
///
/// # Examples
///
/// ```
/// use conflator_core::value_similarity;
///
/// assert_eq!(value_similarity(" Bakery ", "bakery"), 1.0);
/// assert!(value_similarity("Baker Street", "Bakers Street") > 0.9);
/// ```
#[must_use]
pub fn value_similarity(left: &str, right: &str) -> f64 {
    let left = normalise_value(left);
    let right = normalise_value(right);
    if left == right {
        1.0
    } else {
        strsim::jaro_winkler(&left, &right)
    }
}

/// Weighted tag agreement between an incoming and an OSM feature.
///
/// Only the incoming feature's keys are considered. Keys weighted 0 are
/// ignored and keys missing on the OSM side count as complete disagreement.
/// Returns 0 when no key carries weight.
#[expect(
    clippy::float_arithmetic,
    reason = "weighted mean over tag similarities"
)]
#[must_use]
pub fn attribute_score(incoming: &Tags, osm: &Tags, config: &ConflationConfig) -> f64 {
    let (weighted, total_weight) = incoming
        .iter()
        .map(|(key, value)| (config.tag_weight(key), osm.get(key), value))
        .filter(|(weight, _, _)| *weight > 0.0)
        .fold((0.0, 0.0), |(weighted, total), (weight, osm_value, value)| {
            let similarity = osm_value.map_or(0.0, |other| value_similarity(value, other));
            (weighted + weight * similarity, total + weight)
        });
    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    }
}
