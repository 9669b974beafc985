//! Features taking part in a conflation run.
//!
//! A [`Feature`] is either an existing OSM element or an element from the
//! incoming dataset. Features are immutable once loaded; decisions and change
//! operations refer to them by [`FeatureId`].

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod geometry;
mod ids;

pub(crate) use geometry::METRES_PER_DEGREE;
pub use geometry::{Crs, FeatureGeometry, GeometryError, Shape};
pub use ids::{FeatureId, FeatureIdError, OsmElementKind};

/// Free-form key/value attributes, ordered by key.
pub type Tags = BTreeMap<String, String>;

/// Which dataset a feature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum Provenance {
    /// Existing OpenStreetMap data.
    Osm,
    /// Data proposed for import.
    Incoming,
}

/// Version metadata of an OSM element, required to upload modifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OsmVersion {
    /// Element version counter.
    pub version: u32,
    /// Changeset that produced this version, when known.
    pub changeset: Option<u64>,
}

/// A single feature with geometry and tags.
///
/// # Examples
///
/// ```
/// use conflator_core::{Crs, Feature, FeatureGeometry, FeatureId, Provenance, Tags};
///
/// # fn main() -> Result<(), conflator_core::GeometryError> {
/// let mut tags = Tags::new();
/// tags.insert("name".to_owned(), "Corner Shop".to_owned());
/// let geometry = FeatureGeometry::point(Crs::Wgs84, -0.1, 51.5)?;
/// let feature = Feature::incoming(FeatureId::new(1), geometry, tags);
/// assert_eq!(feature.provenance(), Provenance::Incoming);
/// assert_eq!(feature.tag("name"), Some("Corner Shop"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Feature {
    id: FeatureId,
    geometry: FeatureGeometry,
    tags: Tags,
    provenance: Provenance,
    osm_version: Option<OsmVersion>,
}

impl Feature {
    /// Construct an existing OSM feature.
    #[must_use]
    pub const fn osm(id: FeatureId, geometry: FeatureGeometry, tags: Tags) -> Self {
        Self {
            id,
            geometry,
            tags,
            provenance: Provenance::Osm,
            osm_version: None,
        }
    }

    /// Construct a feature from the incoming dataset.
    #[must_use]
    pub const fn incoming(id: FeatureId, geometry: FeatureGeometry, tags: Tags) -> Self {
        Self {
            id,
            geometry,
            tags,
            provenance: Provenance::Incoming,
            osm_version: None,
        }
    }

    /// Attach OSM version metadata while loading.
    #[must_use]
    pub const fn with_osm_version(mut self, version: OsmVersion) -> Self {
        self.osm_version = Some(version);
        self
    }

    /// Identifier of the feature.
    #[must_use]
    pub const fn id(&self) -> FeatureId {
        self.id
    }

    /// Validated geometry.
    #[must_use]
    pub const fn geometry(&self) -> &FeatureGeometry {
        &self.geometry
    }

    /// All tags.
    #[must_use]
    pub const fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Value of a single tag.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Dataset the feature came from.
    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// OSM version metadata, if any was loaded.
    #[must_use]
    pub const fn osm_version(&self) -> Option<OsmVersion> {
        self.osm_version
    }
}
