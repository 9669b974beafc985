//! Fixture files shared by the CLI unit and behaviour tests.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

pub(super) const OSM_SNAPSHOT: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [-0.1, 51.5]},
            "properties": {
                "osm_id": 31,
                "osm_type": "N",
                "version": 5,
                "tags": {"amenity": "post_office", "name": "High Street Post Office"}
            }
        },
        {
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [-0.1, 51.6]},
            "properties": {
                "osm_id": 32,
                "osm_type": "N",
                "tags": {"amenity": "pharmacy", "name": "Chemist"}
            }
        },
        {
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [-0.10005, 51.6]},
            "properties": {
                "osm_id": 33,
                "osm_type": "N",
                "tags": {"amenity": "pharmacy", "name": "Chemist"}
            }
        }
    ]
}"#;

/// One confident match (the post office), one ambiguous pair of chemists and
/// one feature with no OSM neighbour.
pub(super) const INCOMING_DATASET: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "id": 1,
            "geometry": {"type": "Point", "coordinates": [-0.10001, 51.50001]},
            "properties": {"amenity": "post_office", "name": "High Street Post Office"}
        },
        {
            "type": "Feature",
            "id": 2,
            "geometry": {"type": "Point", "coordinates": [-0.100025, 51.6]},
            "properties": {"amenity": "pharmacy", "name": "Chemist"}
        },
        {
            "type": "Feature",
            "id": 3,
            "geometry": {"type": "Point", "coordinates": [-0.3, 51.4]},
            "properties": {"amenity": "library", "name": "Reading Room"}
        }
    ]
}"#;

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    fs::write(path, contents).expect("write fixture file");
}

/// A temporary directory holding `osm.geojson` and `incoming.geojson`.
pub(super) struct InputFiles {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl std::fmt::Debug for InputFiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFiles").field("root", &self.root).finish()
    }
}

impl InputFiles {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        write_utf8(&root.join("osm.geojson"), OSM_SNAPSHOT.as_bytes());
        write_utf8(&root.join("incoming.geojson"), INCOMING_DATASET.as_bytes());
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub(super) fn osm(&self) -> Utf8PathBuf {
        self.root.join("osm.geojson")
    }

    pub(super) fn incoming(&self) -> Utf8PathBuf {
        self.root.join("incoming.geojson")
    }

    pub(super) fn output_dir(&self) -> Utf8PathBuf {
        self.root.join("out")
    }
}
