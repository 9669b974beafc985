//! GeoJSON output of change sets and pending review items.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use conflator_core::{ChangeOp, ChangeSet, MatchCandidate, PendingReview, Tags};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use log::info;
use thiserror::Error;

use crate::shape::geojson_geometry;

/// Errors raised while writing GeoJSON output.
#[derive(Debug, Error)]
pub enum GeoJsonWriteError {
    /// The file or its parent directory could not be written.
    #[error("failed to write {path}")]
    Write {
        /// File that failed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Build one GeoJSON feature per change operation.
///
/// Properties: `action`, `target` (`node/42` style, or null for creations),
/// `source` (incoming id), `version` and `changeset` of the edited element,
/// and a `tags` object.
#[must_use]
pub fn changes_collection(changes: &ChangeSet) -> FeatureCollection {
    collection(changes.ops.iter().map(change_feature).collect())
}

/// Build one GeoJSON feature per pending review item, placed at the incoming
/// geometry.
///
/// Properties: `incoming`, `tags`, `candidates` (best first, each with its
/// OSM label and scores), `error` and any reviewer `overrideTags`.
#[must_use]
pub fn review_collection(pending: &[PendingReview]) -> FeatureCollection {
    collection(pending.iter().map(review_feature).collect())
}

/// Write [`changes_collection`] to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`GeoJsonWriteError::Write`] when the file cannot be written.
pub fn write_changes_geojson(path: &Utf8Path, changes: &ChangeSet) -> Result<(), GeoJsonWriteError> {
    write(path, changes_collection(changes))?;
    info!("wrote {} change operations to {path}", changes.ops.len());
    Ok(())
}

/// Write [`review_collection`] to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`GeoJsonWriteError::Write`] when the file cannot be written.
pub fn write_review_geojson(
    path: &Utf8Path,
    pending: &[PendingReview],
) -> Result<(), GeoJsonWriteError> {
    write(path, review_collection(pending))?;
    info!("wrote {} pending review items to {path}", pending.len());
    Ok(())
}

fn write(path: &Utf8Path, features: FeatureCollection) -> Result<(), GeoJsonWriteError> {
    let text = GeoJson::from(features).to_string();
    conflator_fs::write_utf8_file(path, text.as_bytes()).map_err(|source| {
        GeoJsonWriteError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

const fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn change_feature(op: &ChangeOp) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("action".to_owned(), op.kind.as_str().into());
    properties.insert(
        "target".to_owned(),
        op.target
            .map_or(JsonValue::Null, |target| target.osm_label().into()),
    );
    properties.insert("source".to_owned(), op.source.get().into());
    properties.insert(
        "version".to_owned(),
        op.base_version
            .map_or(JsonValue::Null, |base| base.version.into()),
    );
    properties.insert(
        "changeset".to_owned(),
        op.base_version
            .and_then(|base| base.changeset)
            .map_or(JsonValue::Null, JsonValue::from),
    );
    properties.insert("tags".to_owned(), tags_object(&op.tags));

    Feature {
        bbox: None,
        geometry: Some(geojson_geometry(&op.geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn review_feature(item: &PendingReview) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("incoming".to_owned(), item.id().get().into());
    properties.insert("tags".to_owned(), tags_object(item.incoming.tags()));
    properties.insert(
        "candidates".to_owned(),
        JsonValue::Array(item.candidates.iter().map(candidate_object).collect()),
    );
    properties.insert(
        "error".to_owned(),
        item.error
            .as_deref()
            .map_or(JsonValue::Null, JsonValue::from),
    );
    if let Some(tags) = &item.overrides.tags {
        properties.insert("overrideTags".to_owned(), tags_object(tags));
    }

    Feature {
        bbox: None,
        geometry: Some(geojson_geometry(item.incoming.geometry())),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn candidate_object(candidate: &MatchCandidate) -> JsonValue {
    let mut object = JsonObject::new();
    object.insert("osm".to_owned(), candidate.osm.osm_label().into());
    object.insert("rank".to_owned(), candidate.rank.into());
    object.insert("score".to_owned(), candidate.score.total.into());
    object.insert("geometryScore".to_owned(), candidate.score.geometry.into());
    object.insert("attributeScore".to_owned(), candidate.score.attribute.into());
    object.insert("distanceM".to_owned(), candidate.distance_m.into());
    JsonValue::Object(object)
}

fn tags_object(tags: &Tags) -> JsonValue {
    JsonValue::Object(
        tags.iter()
            .map(|(key, value)| (key.clone(), JsonValue::from(value.as_str())))
            .collect(),
    )
}
