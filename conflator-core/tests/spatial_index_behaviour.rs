//! Behavioural tests for building and querying the spatial index.

use std::cell::RefCell;

use conflator_core::{Crs, Feature, FeatureGeometry, FeatureId, IndexError, SpatialIndex, Tags};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

const BAKERY: FeatureId = FeatureId::new(1);
const CAFE: FeatureId = FeatureId::new(2);
const PHARMACY: u64 = 3;

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[expect(clippy::expect_used, reason = "fixture coordinates are finite literals")]
fn osm_point(id: u64, crs: Crs, x: f64, y: f64, pairs: &[(&str, &str)]) -> Feature {
    let geometry = FeatureGeometry::point(crs, x, y).expect("finite coordinates");
    Feature::osm(FeatureId::new(id), geometry, tags(pairs))
}

#[fixture]
fn index() -> RefCell<SpatialIndex> {
    RefCell::new(SpatialIndex::new())
}

#[fixture]
fn results() -> RefCell<Option<Result<Vec<FeatureId>, IndexError>>> {
    RefCell::new(None)
}

#[given("an index over a bakery, a cafe and a distant pharmacy")]
#[expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]
fn given_index(#[from(index)] index: &RefCell<SpatialIndex>) {
    index
        .borrow_mut()
        .build(vec![
            osm_point(BAKERY.get(), Crs::WebMercator, 40.0, 0.0, &[("shop", "bakery")]),
            osm_point(CAFE.get(), Crs::WebMercator, 0.0, 25.0, &[("amenity", "cafe")]),
            osm_point(PHARMACY, Crs::WebMercator, 900.0, 0.0, &[("amenity", "pharmacy")]),
        ])
        .expect("valid snapshot");
}

#[given("an index that has not been built")]
fn given_unbuilt_index(#[from(index)] index: &RefCell<SpatialIndex>) {
    index.replace(SpatialIndex::new());
}

#[when("the cafe is moved next to the pharmacy")]
#[expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]
fn when_cafe_moves(#[from(index)] index: &RefCell<SpatialIndex>) {
    index
        .borrow_mut()
        .upsert(osm_point(CAFE.get(), Crs::WebMercator, 905.0, 0.0, &[("amenity", "cafe")]))
        .expect("upsert");
}

#[when("I search 60 metres around the town square")]
#[expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]
fn when_search(
    #[from(index)] index: &RefCell<SpatialIndex>,
    #[from(results)] results: &RefCell<Option<Result<Vec<FeatureId>, IndexError>>>,
) {
    let square = FeatureGeometry::point(Crs::WebMercator, 0.0, 0.0).expect("square");
    let found = index
        .borrow()
        .query(&square, 60.0)
        .map(|candidates| candidates.iter().map(|c| c.id()).collect());
    results.replace(Some(found));
}

#[then("the cafe and the bakery are returned in that order")]
fn then_nearest_first(
    #[from(results)] results: &RefCell<Option<Result<Vec<FeatureId>, IndexError>>>,
) {
    assert_eq!(*results.borrow(), Some(Ok(vec![CAFE, BAKERY])));
}

#[then("only the bakery is returned")]
fn then_only_bakery(
    #[from(results)] results: &RefCell<Option<Result<Vec<FeatureId>, IndexError>>>,
) {
    assert_eq!(*results.borrow(), Some(Ok(vec![BAKERY])));
}

#[then("the cafe is at generation 1")]
fn then_generation(#[from(index)] index: &RefCell<SpatialIndex>) {
    assert_eq!(index.borrow().generation(CAFE), Some(1));
}

#[then("the search fails because the index is not built")]
fn then_not_built(
    #[from(results)] results: &RefCell<Option<Result<Vec<FeatureId>, IndexError>>>,
) {
    assert_eq!(*results.borrow(), Some(Err(IndexError::NotBuilt)));
}

#[scenario(path = "tests/features/spatial_index.feature", index = 0)]
fn nearest_first(
    index: RefCell<SpatialIndex>,
    results: RefCell<Option<Result<Vec<FeatureId>, IndexError>>>,
) {
    let _ = (index, results);
}

#[scenario(path = "tests/features/spatial_index.feature", index = 1)]
fn moved_feature(
    index: RefCell<SpatialIndex>,
    results: RefCell<Option<Result<Vec<FeatureId>, IndexError>>>,
) {
    let _ = (index, results);
}

#[scenario(path = "tests/features/spatial_index.feature", index = 2)]
fn unbuilt_index(
    index: RefCell<SpatialIndex>,
    results: RefCell<Option<Result<Vec<FeatureId>, IndexError>>>,
) {
    let _ = (index, results);
}
