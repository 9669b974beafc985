//! R\*-tree index over the OSM snapshot.
//!
//! The index stores OSM features keyed by their bounding envelope and answers
//! radius queries in metres. Each stored feature carries a generation counter
//! that is bumped whenever the feature is replaced, so later stages can tell
//! whether a decision still refers to the data it was matched against.

use std::collections::{HashMap, HashSet};

use log::debug;
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

use crate::feature::METRES_PER_DEGREE;
use crate::{Crs, Feature, FeatureGeometry, FeatureId, GeometryError, Provenance};

/// Longitude bound of WGS84 coordinates.
const MAX_LONGITUDE: f64 = 180.0;

/// Latitude bound of WGS84 coordinates.
const MAX_LATITUDE: f64 = 90.0;

/// Relative slack added to degree envelopes before exact filtering.
const ENVELOPE_SLACK: f64 = 1.01;

/// Errors raised by [`SpatialIndex`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IndexError {
    /// The index was queried or updated before [`SpatialIndex::build`].
    #[error("spatial index has not been built")]
    NotBuilt,
    /// The same feature id appeared twice in one build.
    #[error("feature {id} appears more than once")]
    DuplicateFeature {
        /// Repeated identifier.
        id: FeatureId,
    },
    /// Only OSM features may be indexed.
    #[error("feature {id} is not an OSM feature")]
    NotOsmFeature {
        /// Identifier of the rejected feature.
        id: FeatureId,
    },
    /// Indexed features must share one reference system.
    #[error("feature {id} uses {found} but the index uses {expected}")]
    MixedCrs {
        /// Identifier of the rejected feature.
        id: FeatureId,
        /// Reference system of the index.
        expected: Crs,
        /// Reference system of the feature.
        found: Crs,
    },
    /// A query geometry used a different reference system from the index.
    #[error("query uses {found} but the index uses {expected}")]
    CrsMismatch {
        /// Reference system of the index.
        expected: Crs,
        /// Reference system of the query geometry.
        found: Crs,
    },
    /// Query radii must be finite and non-negative.
    #[error("query radius must be finite and non-negative, got {radius}")]
    InvalidRadius {
        /// Rejected radius.
        radius: f64,
    },
    /// Exact distance evaluation failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// An OSM feature found by [`SpatialIndex::query`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialCandidate<'a> {
    /// The indexed OSM feature.
    pub feature: &'a Feature,
    /// Metric distance from the query geometry.
    pub distance_m: f64,
    /// Generation of the feature at query time.
    pub generation: u64,
}

impl SpatialCandidate<'_> {
    /// Identifier of the candidate feature.
    #[must_use]
    pub const fn id(&self) -> FeatureId {
        self.feature.id()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct IndexedFeature {
    id: FeatureId,
    envelope: AABB<[f64; 2]>,
}

impl IndexedFeature {
    fn new(feature: &Feature) -> Self {
        let rect = feature.geometry().bounding_rect();
        let min = rect.min();
        let max = rect.max();
        Self {
            id: feature.id(),
            envelope: AABB::from_corners([min.x, min.y], [max.x, max.y]),
        }
    }
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

#[derive(Debug, Clone)]
struct Entry {
    feature: Feature,
    generation: u64,
}

#[derive(Debug, Default)]
struct BuiltIndex {
    crs: Option<Crs>,
    tree: RTree<IndexedFeature>,
    entries: HashMap<FeatureId, Entry>,
}

/// Spatial index over OSM features.
///
/// # Examples
///
/// ```
/// use conflator_core::{Crs, Feature, FeatureGeometry, FeatureId, SpatialIndex, Tags};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let shop = Feature::osm(
///     FeatureId::new(1),
///     FeatureGeometry::point(Crs::WebMercator, 0.0, 0.0)?,
///     Tags::new(),
/// );
/// let mut index = SpatialIndex::new();
/// index.build(vec![shop])?;
///
/// let origin = FeatureGeometry::point(Crs::WebMercator, 3.0, 4.0)?;
/// let found = index.query(&origin, 10.0)?;
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0].distance_m, 5.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SpatialIndex {
    built: Option<BuiltIndex>,
    generations: HashMap<FeatureId, u64>,
}

impl SpatialIndex {
    /// Create an unbuilt index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`SpatialIndex::build`] has succeeded.
    #[must_use]
    pub const fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Number of indexed features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.built.as_ref().map_or(0, |built| built.entries.len())
    }

    /// Whether the index holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference system shared by the indexed features.
    #[must_use]
    pub fn crs(&self) -> Option<Crs> {
        self.built.as_ref().and_then(|built| built.crs)
    }

    /// Replace the index contents with `features`.
    ///
    /// Features already known from an earlier build keep counting
    /// generations upwards.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] for duplicate ids, non-OSM features or mixed
    /// reference systems. The previous contents are kept on error.
    pub fn build<I>(&mut self, features: I) -> Result<(), IndexError>
    where
        I: IntoIterator<Item = Feature>,
    {
        let mut crs = None;
        let mut entries = HashMap::new();
        let mut generations = self.generations.clone();
        for feature in features {
            let id = feature.id();
            check_feature(&feature, &mut crs)?;
            if entries.contains_key(&id) {
                return Err(IndexError::DuplicateFeature { id });
            }
            let generation = next_generation(&mut generations, id);
            entries.insert(
                id,
                Entry {
                    feature,
                    generation,
                },
            );
        }
        let objects = entries
            .values()
            .map(|entry| IndexedFeature::new(&entry.feature))
            .collect();
        debug!("built spatial index with {} OSM features", entries.len());
        self.built = Some(BuiltIndex {
            crs,
            tree: RTree::bulk_load(objects),
            entries,
        });
        self.generations = generations;
        Ok(())
    }

    /// Find OSM features within `radius_m` metres of `geometry`.
    ///
    /// Results are ordered by increasing distance, ties by smaller id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotBuilt`], [`IndexError::CrsMismatch`] or
    /// [`IndexError::InvalidRadius`].
    pub fn query(
        &self,
        geometry: &FeatureGeometry,
        radius_m: f64,
    ) -> Result<Vec<SpatialCandidate<'_>>, IndexError> {
        let built = self.built.as_ref().ok_or(IndexError::NotBuilt)?;
        if !(radius_m.is_finite() && radius_m >= 0.0) {
            return Err(IndexError::InvalidRadius { radius: radius_m });
        }
        let Some(crs) = built.crs else {
            return Ok(Vec::new());
        };
        if geometry.crs() != crs {
            return Err(IndexError::CrsMismatch {
                expected: crs,
                found: geometry.crs(),
            });
        }
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for envelope in search_envelopes(geometry, radius_m) {
            for object in built.tree.locate_in_envelope_intersecting(&envelope) {
                if !seen.insert(object.id) {
                    continue;
                }
                let Some(entry) = built.entries.get(&object.id) else {
                    continue;
                };
                let distance_m = entry.feature.geometry().distance_m(geometry)?;
                if distance_m <= radius_m {
                    found.push(SpatialCandidate {
                        feature: &entry.feature,
                        distance_m,
                        generation: entry.generation,
                    });
                }
            }
        }
        found.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then_with(|| a.id().cmp(&b.id()))
        });
        Ok(found)
    }

    /// Insert or replace one OSM feature, returning its new generation.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotBuilt`] before the first build,
    /// [`IndexError::NotOsmFeature`] or [`IndexError::MixedCrs`].
    pub fn upsert(&mut self, feature: Feature) -> Result<u64, IndexError> {
        let built = self.built.as_mut().ok_or(IndexError::NotBuilt)?;
        check_feature(&feature, &mut built.crs)?;
        let id = feature.id();
        if let Some(previous) = built.entries.get(&id) {
            built.tree.remove(&IndexedFeature::new(&previous.feature));
        }
        let generation = next_generation(&mut self.generations, id);
        built.tree.insert(IndexedFeature::new(&feature));
        built.entries.insert(
            id,
            Entry {
                feature,
                generation,
            },
        );
        debug!("upserted OSM feature {id} at generation {generation}");
        Ok(generation)
    }

    /// Remove one OSM feature, returning it if it was indexed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotBuilt`] before the first build.
    pub fn remove(&mut self, id: FeatureId) -> Result<Option<Feature>, IndexError> {
        let built = self.built.as_mut().ok_or(IndexError::NotBuilt)?;
        let Some(entry) = built.entries.remove(&id) else {
            return Ok(None);
        };
        built.tree.remove(&IndexedFeature::new(&entry.feature));
        debug!("removed OSM feature {id}");
        Ok(Some(entry.feature))
    }

    /// Current generation of an indexed feature.
    #[must_use]
    pub fn generation(&self, id: FeatureId) -> Option<u64> {
        self.entry(id).map(|entry| entry.generation)
    }

    /// Current state of an indexed feature.
    #[must_use]
    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.entry(id).map(|entry| &entry.feature)
    }

    fn entry(&self, id: FeatureId) -> Option<&Entry> {
        self.built.as_ref().and_then(|built| built.entries.get(&id))
    }
}

fn check_feature(feature: &Feature, crs: &mut Option<Crs>) -> Result<(), IndexError> {
    let id = feature.id();
    if feature.provenance() != Provenance::Osm {
        return Err(IndexError::NotOsmFeature { id });
    }
    let found = feature.geometry().crs();
    match *crs {
        Some(expected) if expected != found => Err(IndexError::MixedCrs {
            id,
            expected,
            found,
        }),
        Some(_) => Ok(()),
        None => {
            *crs = Some(found);
            Ok(())
        }
    }
}

fn next_generation(generations: &mut HashMap<FeatureId, u64>, id: FeatureId) -> u64 {
    let generation = generations
        .get(&id)
        .map_or(0, |previous| previous.saturating_add(1));
    generations.insert(id, generation);
    generation
}

/// Envelopes covering every point within `radius_m` of `geometry`.
///
/// WGS84 radii are converted to degrees. The longitude expansion uses the
/// latitude furthest from the equator; boxes touching a pole span every
/// longitude, and boxes crossing the antimeridian are split in two.
#[expect(
    clippy::float_arithmetic,
    reason = "envelope expansion converts metres to coordinate units"
)]
fn search_envelopes(geometry: &FeatureGeometry, radius_m: f64) -> Vec<AABB<[f64; 2]>> {
    let rect = geometry.bounding_rect();
    let (min, max) = (rect.min(), rect.max());
    match geometry.crs() {
        Crs::WebMercator => vec![AABB::from_corners(
            [min.x - radius_m, min.y - radius_m],
            [max.x + radius_m, max.y + radius_m],
        )],
        Crs::Wgs84 => {
            let dy = radius_m / METRES_PER_DEGREE * ENVELOPE_SLACK;
            let south = min.y - dy;
            let north = max.y + dy;
            if south <= -MAX_LATITUDE || north >= MAX_LATITUDE {
                return vec![longitude_band(
                    -MAX_LONGITUDE,
                    MAX_LONGITUDE,
                    south.max(-MAX_LATITUDE),
                    north.min(MAX_LATITUDE),
                )];
            }
            let extreme_lat = south.abs().max(north.abs());
            let dx = dy / extreme_lat.to_radians().cos();
            let (west, east) = (min.x - dx, max.x + dx);
            if dx >= MAX_LONGITUDE || east - west >= 2.0 * MAX_LONGITUDE {
                vec![longitude_band(-MAX_LONGITUDE, MAX_LONGITUDE, south, north)]
            } else if west < -MAX_LONGITUDE {
                vec![
                    longitude_band(-MAX_LONGITUDE, east, south, north),
                    longitude_band(west + 2.0 * MAX_LONGITUDE, MAX_LONGITUDE, south, north),
                ]
            } else if east > MAX_LONGITUDE {
                vec![
                    longitude_band(west, MAX_LONGITUDE, south, north),
                    longitude_band(-MAX_LONGITUDE, east - 2.0 * MAX_LONGITUDE, south, north),
                ]
            } else {
                vec![longitude_band(west, east, south, north)]
            }
        }
    }
}

fn longitude_band(west: f64, east: f64, south: f64, north: f64) -> AABB<[f64; 2]> {
    AABB::from_corners([west, south], [east, north])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tags;
    use crate::test_support::{incoming_point, osm_point};
    use rstest::{fixture, rstest};

    #[fixture]
    fn mercator_index() -> SpatialIndex {
        let mut index = SpatialIndex::new();
        index
            .build(vec![
                osm_point(3, Crs::WebMercator, 10.0, 0.0, &[]),
                osm_point(1, Crs::WebMercator, 0.0, 10.0, &[]),
                osm_point(2, Crs::WebMercator, 30.0, 0.0, &[]),
            ])
            .expect("valid features");
        index
    }

    fn origin() -> FeatureGeometry {
        FeatureGeometry::point(Crs::WebMercator, 0.0, 0.0).expect("query point")
    }

    #[rstest]
    fn query_before_build_fails() {
        let index = SpatialIndex::new();
        assert_eq!(
            index.query(&origin(), 10.0).expect_err("unbuilt"),
            IndexError::NotBuilt
        );
    }

    #[rstest]
    fn orders_by_distance_then_id(mercator_index: SpatialIndex) {
        let found = mercator_index.query(&origin(), 20.0).expect("query");
        let ids: Vec<_> = found.iter().map(|c| c.id().get()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[rstest]
    #[case(-1.0)]
    #[case(f64::NAN)]
    fn rejects_invalid_radius(mercator_index: SpatialIndex, #[case] radius: f64) {
        assert!(matches!(
            mercator_index.query(&origin(), radius),
            Err(IndexError::InvalidRadius { .. })
        ));
    }

    #[rstest]
    fn rejects_query_in_other_crs(mercator_index: SpatialIndex) {
        let geometry = FeatureGeometry::point(Crs::Wgs84, 0.0, 0.0).expect("query point");
        assert!(matches!(
            mercator_index.query(&geometry, 10.0),
            Err(IndexError::CrsMismatch { .. })
        ));
    }

    #[rstest]
    fn rejects_duplicate_and_incoming_features() {
        let mut index = SpatialIndex::new();
        let duplicate = index.build(vec![
            osm_point(1, Crs::Wgs84, 0.0, 0.0, &[]),
            osm_point(1, Crs::Wgs84, 1.0, 0.0, &[]),
        ]);
        assert!(matches!(
            duplicate,
            Err(IndexError::DuplicateFeature { .. })
        ));
        let incoming = index.build(vec![incoming_point(5, Crs::Wgs84, 0.0, 0.0, &[])]);
        assert!(matches!(incoming, Err(IndexError::NotOsmFeature { .. })));
        assert!(!index.is_built());
    }

    #[rstest]
    fn rejects_mixed_crs() {
        let mut index = SpatialIndex::new();
        let result = index.build(vec![
            osm_point(1, Crs::Wgs84, 0.0, 0.0, &[]),
            osm_point(2, Crs::WebMercator, 0.0, 0.0, &[]),
        ]);
        assert!(matches!(result, Err(IndexError::MixedCrs { .. })));
    }

    #[rstest]
    fn upsert_bumps_generation_and_moves_feature(mut mercator_index: SpatialIndex) {
        let id = FeatureId::new(1);
        assert_eq!(mercator_index.generation(id), Some(0));
        let moved = osm_point(1, Crs::WebMercator, 500.0, 500.0, &[]);
        assert_eq!(mercator_index.upsert(moved).expect("upsert"), 1);
        let found = mercator_index.query(&origin(), 20.0).expect("query");
        assert!(found.iter().all(|c| c.id() != id));
    }

    #[rstest]
    fn reinserted_feature_does_not_reuse_generation(mut mercator_index: SpatialIndex) {
        let id = FeatureId::new(2);
        mercator_index.remove(id).expect("remove");
        assert_eq!(mercator_index.generation(id), None);
        let again = Feature::osm(
            id,
            FeatureGeometry::point(Crs::WebMercator, 30.0, 0.0).expect("point"),
            Tags::new(),
        );
        assert_eq!(mercator_index.upsert(again).expect("upsert"), 1);
    }

    #[rstest]
    fn upsert_before_build_fails() {
        let mut index = SpatialIndex::new();
        let result = index.upsert(osm_point(1, Crs::Wgs84, 0.0, 0.0, &[]));
        assert_eq!(result, Err(IndexError::NotBuilt));
    }

    #[rstest]
    fn wgs84_radius_is_metric_near_the_poles() {
        let mut index = SpatialIndex::new();
        // 0.002 degrees of longitude at 80N is roughly 38.6 m.
        index
            .build(vec![osm_point(9, Crs::Wgs84, 0.002, 80.0, &[])])
            .expect("build");
        let geometry = FeatureGeometry::point(Crs::Wgs84, 0.0, 80.0).expect("query point");
        assert_eq!(index.query(&geometry, 50.0).expect("query").len(), 1);
        assert!(index.query(&geometry, 30.0).expect("query").is_empty());
    }

    #[rstest]
    // 0.04 degrees of longitude at 89.5N is roughly 38.8 m.
    #[case((0.04, 89.5), (0.0, 89.5))]
    // Both points sit 11 m from the pole on opposite meridians.
    #[case((180.0, 89.9999), (0.0, 89.9999))]
    #[case((0.0, -89.9999), (90.0, -89.9999))]
    fn wgs84_queries_reach_past_high_latitudes(
        #[case] stored: (f64, f64),
        #[case] queried_at: (f64, f64),
    ) {
        let mut index = SpatialIndex::new();
        index
            .build(vec![osm_point(9, Crs::Wgs84, stored.0, stored.1, &[])])
            .expect("build");
        let geometry = FeatureGeometry::point(Crs::Wgs84, queried_at.0, queried_at.1).expect("query point");
        let found = index.query(&geometry, 50.0).expect("query");
        assert_eq!(found.len(), 1);
        assert!(found.iter().all(|c| c.distance_m < 50.0));
    }

    #[rstest]
    #[case((-179.9999, 0.0), (179.9999, 0.0))]
    #[case((179.9999, 0.0), (-179.9999, 0.0))]
    fn wgs84_queries_cross_the_antimeridian(
        #[case] stored: (f64, f64),
        #[case] queried_at: (f64, f64),
    ) {
        let mut index = SpatialIndex::new();
        index
            .build(vec![
                osm_point(7, Crs::Wgs84, stored.0, stored.1, &[]),
                osm_point(8, Crs::Wgs84, 0.0, 0.0, &[]),
            ])
            .expect("build");
        let geometry = FeatureGeometry::point(Crs::Wgs84, queried_at.0, queried_at.1).expect("query point");
        let found = index.query(&geometry, 50.0).expect("query");
        let ids: Vec<_> = found.iter().map(|c| c.id().get()).collect();
        assert_eq!(ids, vec![7]);
    }

    #[rstest]
    fn empty_index_answers_with_no_candidates() {
        let mut index = SpatialIndex::new();
        index.build(Vec::new()).expect("empty build");
        assert!(index.query(&origin(), 10.0).expect("query").is_empty());
    }
}
