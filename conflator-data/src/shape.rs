//! Conversion between GeoJSON geometry values and the core [`Shape`] model.

use conflator_core::{Crs, FeatureGeometry, GeometryError, Shape};
use geo::{Area, Geometry};
use thiserror::Error;

/// Why a GeoJSON geometry could not become a [`FeatureGeometry`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    /// The feature carried no geometry.
    #[error("feature has no geometry")]
    Missing,
    /// The GeoJSON value was structurally malformed.
    #[error("malformed {kind} geometry")]
    Malformed {
        /// GeoJSON type name.
        kind: &'static str,
    },
    /// The geometry type has no counterpart in the feature model.
    #[error("{kind} geometries are not supported")]
    Unsupported {
        /// GeoJSON type name.
        kind: &'static str,
    },
    /// The shape failed validation.
    #[error(transparent)]
    Invalid(#[from] GeometryError),
}

/// Convert a GeoJSON geometry value into a validated [`FeatureGeometry`].
///
/// Multi-polygons collapse to their largest member by planar area. A
/// multi-line-string with exactly one member becomes a plain line string.
///
/// # Errors
///
/// Returns [`ShapeError`] for malformed, unsupported or invalid input.
pub fn feature_geometry(value: geojson::Value, crs: Crs) -> Result<FeatureGeometry, ShapeError> {
    let kind = geojson_kind(&value);
    let geometry = Geometry::<f64>::try_from(value).map_err(|_| ShapeError::Malformed { kind })?;
    let shape = match geometry {
        Geometry::Point(point) => Shape::Point(point),
        Geometry::LineString(line) => Shape::LineString(line),
        Geometry::Polygon(polygon) => Shape::Polygon(polygon),
        Geometry::MultiPolygon(multi) => multi
            .0
            .into_iter()
            .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map(Shape::Polygon)
            .ok_or(ShapeError::Malformed { kind })?,
        Geometry::MultiLineString(multi) => {
            let mut lines = multi.0.into_iter();
            match (lines.next(), lines.next()) {
                (Some(line), None) => Shape::LineString(line),
                _ => return Err(ShapeError::Unsupported { kind }),
            }
        }
        _ => return Err(ShapeError::Unsupported { kind }),
    };
    Ok(FeatureGeometry::new(crs, shape)?)
}

/// Convert a feature geometry into a GeoJSON geometry.
#[must_use]
pub fn geojson_geometry(geometry: &FeatureGeometry) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(&geometry.to_geo()))
}

const fn geojson_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::Value;
    use rstest::rstest;

    #[expect(clippy::float_arithmetic, reason = "fixture ring corners")]
    fn square(origin: f64, side: f64) -> Vec<Vec<Vec<f64>>> {
        let far = origin + side;
        vec![vec![
            vec![origin, origin],
            vec![far, origin],
            vec![far, far],
            vec![origin, far],
            vec![origin, origin],
        ]]
    }

    #[rstest]
    fn multipolygon_keeps_the_largest_member() {
        let value = Value::MultiPolygon(vec![square(0.0, 1.0), square(10.0, 3.0), square(5.0, 2.0)]);
        let geometry = feature_geometry(value, Crs::Wgs84).expect("valid multipolygon");
        let Shape::Polygon(polygon) = geometry.shape() else {
            panic!("expected a polygon, got {:?}", geometry.shape());
        };
        assert_eq!(polygon.unsigned_area(), 9.0);
    }

    #[rstest]
    fn single_member_multilinestring_becomes_a_line() {
        let value = Value::MultiLineString(vec![vec![vec![0.0, 0.0], vec![1.0, 1.0]]]);
        let geometry = feature_geometry(value, Crs::WebMercator).expect("valid line");
        assert_eq!(geometry.kind(), "LineString");
        assert_eq!(geometry.crs(), Crs::WebMercator);
    }

    #[rstest]
    #[case(Value::MultiLineString(vec![
        vec![vec![0.0, 0.0], vec![1.0, 1.0]],
        vec![vec![2.0, 2.0], vec![3.0, 3.0]],
    ]), "MultiLineString")]
    #[case(Value::MultiPoint(vec![vec![0.0, 0.0]]), "MultiPoint")]
    #[case(Value::GeometryCollection(vec![]), "GeometryCollection")]
    fn other_kinds_are_unsupported(#[case] value: Value, #[case] kind: &'static str) {
        assert_eq!(
            feature_geometry(value, Crs::Wgs84),
            Err(ShapeError::Unsupported { kind })
        );
    }

    #[rstest]
    fn short_line_fails_validation() {
        let value = Value::LineString(vec![vec![0.0, 0.0]]);
        assert!(matches!(
            feature_geometry(value, Crs::Wgs84),
            Err(ShapeError::Invalid(GeometryError::TooFewPositions { .. }))
        ));
    }

    #[rstest]
    fn exported_geometry_keeps_coordinates() {
        let geometry = FeatureGeometry::point(Crs::Wgs84, -0.12, 51.5).expect("finite point");
        assert_eq!(
            geojson_geometry(&geometry).value,
            Value::Point(vec![-0.12, 51.5])
        );
    }
}
