//! Data adapters for the OSM conflator.
//!
//! Responsibilities:
//! - Build PostPass SQL extractions for a bounding box and tag filter.
//! - Load PostPass responses and user GeoJSON files into the feature model.
//! - Write change operations and pending review items as GeoJSON.
//!
//! Boundaries:
//! - Do not encode conflation rules (live in `conflator-core`).
//! - No network access; callers hand PostPass responses in as text or files.
//!
//! Invariants:
//! - A malformed feature never aborts a load; it is skipped and reported.
//! - No global mutable state.

#![forbid(unsafe_code)]

mod export;
mod load;
mod postpass;
mod shape;

pub use export::{
    GeoJsonWriteError, changes_collection, review_collection, write_changes_geojson,
    write_review_geojson,
};
pub use load::{
    GeoJsonLoad, GeoJsonLoadError, LoadOptions, SkipReason, SkippedFeature, load_incoming_geojson,
    load_osm_geojson, parse_incoming_geojson, parse_osm_geojson,
};
pub use postpass::{BoundingBox, BoundingBoxError, PostpassQuery, PostpassTable, QueryError, TagFilter};
pub use shape::{ShapeError, feature_geometry, geojson_geometry};
