//! Facade crate for the OSM conflation engine.
//!
//! This crate re-exports the core domain types and, behind the `geojson`
//! feature, the GeoJSON and PostPass adapters.

#![forbid(unsafe_code)]

pub use conflator_core::{
    AutoResolver, ChangeBuilder, ChangeError, ChangeKind, ChangeOp, ChangeSet, ConfigError,
    ConflationConfig, ConflationSession, Crs, Decision, DecisionKind, Feature, FeatureGeometry,
    FeatureId, GeometryPolicy, IndexError, MatchCandidate, MatchError, MatchScore, Matcher,
    OsmElementKind, Overrides, PendingReview, ReviewError, ReviewQueue, RunSummary, SessionError,
    Shape, SpatialIndex, Tags, WeightedMatcher,
};

#[cfg(feature = "geojson")]
pub use conflator_data::{
    BoundingBox, GeoJsonLoad, GeoJsonLoadError, GeoJsonWriteError, LoadOptions, PostpassQuery,
    PostpassTable, TagFilter, load_incoming_geojson, load_osm_geojson, write_changes_geojson,
    write_review_geojson,
};
