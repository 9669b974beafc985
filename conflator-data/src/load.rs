//! Load OSM snapshots and incoming datasets from GeoJSON.
//!
//! OSM snapshots are PostPass responses: every feature carries `osm_id`,
//! usually `osm_type` and a `tags` object. Incoming datasets are arbitrary
//! user files whose scalar properties become tags. Features whose geometry
//! or identifier cannot be used are skipped with a warning and reported in
//! [`GeoJsonLoad::skipped`]; they never abort the load. Identifiers are
//! unique within one load: a feature reusing an earlier id is skipped.

use std::collections::HashSet;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use conflator_core::{
    Crs, Feature, FeatureId, FeatureIdError, OsmElementKind, OsmVersion, Tags,
};
use geojson::{GeoJson, JsonObject, JsonValue, feature::Id};
use log::{info, warn};
use thiserror::Error;

use crate::shape::{ShapeError, feature_geometry};

/// Options for loading incoming datasets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadOptions {
    /// Reference system of the file's coordinates.
    pub crs: Crs,
    /// Property holding each feature's numeric identifier. When unset the
    /// GeoJSON feature id is used, then the feature's 1-based position.
    pub id_property: Option<String>,
}

impl LoadOptions {
    /// Read ids from `property` instead of the GeoJSON feature id.
    #[must_use]
    pub fn with_id_property(mut self, property: impl Into<String>) -> Self {
        self.id_property = Some(property.into());
        self
    }

    /// Interpret coordinates in `crs`.
    #[must_use]
    pub const fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }
}

/// Features read from a file, plus the ones that were left out.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoJsonLoad {
    /// Usable features in file order.
    pub features: Vec<Feature>,
    /// Features that could not be used.
    pub skipped: Vec<SkippedFeature>,
}

/// A feature left out of a load.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFeature {
    /// Zero-based position in the source collection.
    pub index: usize,
    /// Why it was left out.
    pub reason: SkipReason,
}

/// Why a single feature was left out of a load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    /// The geometry is missing, unsupported or invalid.
    #[error(transparent)]
    Geometry(#[from] ShapeError),
    /// No usable identifier was found.
    #[error("missing or non-numeric {property} identifier")]
    MissingId {
        /// Where the identifier was expected.
        property: String,
    },
    /// The OSM identifier does not fit the feature id space.
    #[error(transparent)]
    InvalidId(#[from] FeatureIdError),
    /// An incoming identifier was negative.
    #[error("identifier {raw_id} is negative")]
    NegativeId {
        /// Identifier as found.
        raw_id: i64,
    },
    /// An earlier feature in the same file already uses this identifier.
    #[error("identifier {id} is already used by an earlier feature")]
    DuplicateId {
        /// Repeated identifier.
        id: FeatureId,
    },
    /// The `osm_type` property is not a known element type.
    #[error("unknown OSM element type {value:?}")]
    UnknownElementType {
        /// Value as found.
        value: String,
    },
}

/// Errors that abort a whole load.
#[derive(Debug, Error)]
pub enum GeoJsonLoadError {
    /// The file could not be read.
    #[error("failed to read {path}")]
    Read {
        /// File that failed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The text is not valid GeoJSON.
    #[error("failed to parse GeoJSON")]
    Parse {
        /// Parser error.
        #[source]
        source: Box<geojson::Error>,
    },
    /// The document is a bare geometry rather than features.
    #[error("expected a Feature or FeatureCollection, found a bare geometry")]
    BareGeometry,
}

/// Read a PostPass response from disk.
///
/// # Errors
///
/// Returns [`GeoJsonLoadError`] when the file cannot be read or parsed.
pub fn load_osm_geojson(path: &Utf8Path) -> Result<GeoJsonLoad, GeoJsonLoadError> {
    let text = read(path)?;
    let load = parse_osm_geojson(&text)?;
    log_load(path, "OSM", &load);
    Ok(load)
}

/// Parse a PostPass response. Coordinates are WGS84.
///
/// # Errors
///
/// Returns [`GeoJsonLoadError`] when the text is not a feature document.
pub fn parse_osm_geojson(text: &str) -> Result<GeoJsonLoad, GeoJsonLoadError> {
    collect(text, |_, feature| {
        let id = osm_id(feature.properties.as_ref())?;
        let geometry = geometry_of(feature.geometry, Crs::Wgs84)?;
        let properties = feature.properties.unwrap_or_default();
        let parsed = Feature::osm(id, geometry, osm_tags(&properties));
        Ok(match osm_version(&properties) {
            Some(version) => parsed.with_osm_version(version),
            None => parsed,
        })
    })
}

/// Read an incoming dataset from disk.
///
/// # Errors
///
/// Returns [`GeoJsonLoadError`] when the file cannot be read or parsed.
pub fn load_incoming_geojson(
    path: &Utf8Path,
    options: &LoadOptions,
) -> Result<GeoJsonLoad, GeoJsonLoadError> {
    let text = read(path)?;
    let load = parse_incoming_geojson(&text, options)?;
    log_load(path, "incoming", &load);
    Ok(load)
}

/// Parse an incoming dataset.
///
/// # Errors
///
/// Returns [`GeoJsonLoadError`] when the text is not a feature document.
pub fn parse_incoming_geojson(
    text: &str,
    options: &LoadOptions,
) -> Result<GeoJsonLoad, GeoJsonLoadError> {
    collect(text, |index, feature| {
        let id = incoming_id(index, &feature, options.id_property.as_deref())?;
        let geometry = geometry_of(feature.geometry, options.crs)?;
        let tags = feature
            .properties
            .iter()
            .flatten()
            .filter(|(key, _)| Some(key.as_str()) != options.id_property.as_deref())
            .filter_map(|(key, value)| scalar_text(value).map(|text| (key.clone(), text)))
            .collect();
        Ok(Feature::incoming(id, geometry, tags))
    })
}

fn read(path: &Utf8Path) -> Result<String, GeoJsonLoadError> {
    conflator_fs::read_utf8_to_string(path).map_err(|source| GeoJsonLoadError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn log_load(path: &Utf8Path, dataset: &str, load: &GeoJsonLoad) {
    info!(
        "loaded {} {dataset} features from {path} ({} skipped)",
        load.features.len(),
        load.skipped.len()
    );
}

fn collect<F>(text: &str, mut convert: F) -> Result<GeoJsonLoad, GeoJsonLoadError>
where
    F: FnMut(usize, geojson::Feature) -> Result<Feature, SkipReason>,
{
    let document = text
        .parse::<GeoJson>()
        .map_err(|source| GeoJsonLoadError::Parse {
            source: Box::new(source),
        })?;
    let features = match document {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => return Err(GeoJsonLoadError::BareGeometry),
    };

    let mut load = GeoJsonLoad::default();
    let mut seen = HashSet::with_capacity(features.len());
    for (index, feature) in features.into_iter().enumerate() {
        let converted = convert(index, feature).and_then(|parsed| {
            if seen.insert(parsed.id()) {
                Ok(parsed)
            } else {
                Err(SkipReason::DuplicateId { id: parsed.id() })
            }
        });
        match converted {
            Ok(parsed) => load.features.push(parsed),
            Err(reason) => {
                warn!("skipping feature {index}: {reason}");
                load.skipped.push(SkippedFeature { index, reason });
            }
        }
    }
    Ok(load)
}

fn geometry_of(
    geometry: Option<geojson::Geometry>,
    crs: Crs,
) -> Result<conflator_core::FeatureGeometry, SkipReason> {
    let value = geometry.ok_or(ShapeError::Missing)?.value;
    Ok(feature_geometry(value, crs)?)
}

fn osm_id(maybe_properties: Option<&JsonObject>) -> Result<FeatureId, SkipReason> {
    let missing = || SkipReason::MissingId {
        property: "osm_id".to_owned(),
    };
    let properties = maybe_properties.ok_or_else(missing)?;
    let raw_id = properties
        .get("osm_id")
        .and_then(json_integer)
        .ok_or_else(missing)?;
    let kind = match properties.get("osm_type").and_then(JsonValue::as_str) {
        None => OsmElementKind::Node,
        Some(value) => element_kind(value).ok_or_else(|| SkipReason::UnknownElementType {
            value: value.to_owned(),
        })?,
    };
    Ok(FeatureId::osm(kind, raw_id)?)
}

fn element_kind(value: &str) -> Option<OsmElementKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "n" | "node" => Some(OsmElementKind::Node),
        "w" | "way" => Some(OsmElementKind::Way),
        "r" | "relation" => Some(OsmElementKind::Relation),
        _ => None,
    }
}

/// Tags from the `tags` property, which PostPass emits as an object or, for
/// some clients, as JSON text.
fn osm_tags(properties: &JsonObject) -> Tags {
    match properties.get("tags") {
        Some(JsonValue::Object(tags)) => scalar_tags(tags),
        Some(JsonValue::String(text)) => serde_json::from_str::<JsonObject>(text)
            .map(|tags| scalar_tags(&tags))
            .unwrap_or_default(),
        _ => Tags::new(),
    }
}

fn scalar_tags(object: &JsonObject) -> Tags {
    object
        .iter()
        .filter_map(|(key, value)| scalar_text(value).map(|text| (key.clone(), text)))
        .collect()
}

fn osm_version(properties: &JsonObject) -> Option<OsmVersion> {
    let version = properties
        .get("version")
        .or_else(|| properties.get("osm_version"))
        .and_then(json_integer)
        .and_then(|raw| u32::try_from(raw).ok())?;
    let changeset = properties
        .get("changeset")
        .and_then(json_integer)
        .and_then(|raw| u64::try_from(raw).ok());
    Some(OsmVersion { version, changeset })
}

fn incoming_id(
    index: usize,
    feature: &geojson::Feature,
    id_property: Option<&str>,
) -> Result<FeatureId, SkipReason> {
    if let Some(property) = id_property {
        return feature
            .property(property)
            .and_then(json_integer)
            .ok_or_else(|| SkipReason::MissingId {
                property: property.to_owned(),
            })
            .and_then(non_negative);
    }
    match &feature.id {
        Some(Id::Number(number)) => number
            .as_i64()
            .ok_or_else(|| SkipReason::MissingId {
                property: "id".to_owned(),
            })
            .and_then(non_negative),
        Some(Id::String(text)) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| SkipReason::MissingId {
                property: "id".to_owned(),
            })
            .and_then(non_negative),
        None => Ok(FeatureId::from(index as u64 + 1)),
    }
}

fn non_negative(raw_id: i64) -> Result<FeatureId, SkipReason> {
    u64::try_from(raw_id)
        .map(FeatureId::new)
        .map_err(|_| SkipReason::NegativeId { raw_id })
}

fn json_integer(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(number) => number.as_i64(),
        JsonValue::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Number(number) => Some(number.to_string()),
        JsonValue::Bool(flag) => Some(flag.to_string()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}
