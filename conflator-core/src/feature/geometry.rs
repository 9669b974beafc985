//! Validated feature geometries and metric distance between them.
//!
//! Every geometry carries the coordinate reference system it was loaded in.
//! Distances are always reported in metres: WGS84 geometries use the
//! haversine formula while Web Mercator geometries use planar distance.

use std::fmt;

use geo::{
    BoundingRect, Closest, ClosestPoint, Coord, CoordsIter, Distance, Haversine, InteriorPoint,
    LineString, Point, Polygon, Rect,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used by [`Haversine`], expressed as metres per degree
/// of arc.
pub(crate) const METRES_PER_DEGREE: f64 = 111_195.08;

/// Coordinate reference system of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum Crs {
    /// Longitude and latitude in degrees (EPSG:4326).
    #[default]
    Wgs84,
    /// Spherical Mercator metres (EPSG:3857).
    WebMercator,
}

impl Crs {
    /// EPSG code of the reference system.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::WebMercator => 3857,
        }
    }

    /// Distance in metres between two points expressed in this system.
    #[expect(
        clippy::float_arithmetic,
        reason = "planar distance requires coordinate differences"
    )]
    #[must_use]
    pub fn metres_between(self, a: Point<f64>, b: Point<f64>) -> f64 {
        match self {
            Self::Wgs84 => Haversine.distance(a, b),
            Self::WebMercator => (a.x() - b.x()).hypot(a.y() - b.y()),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Supported geometry shapes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Shape {
    /// A single position.
    Point(Point<f64>),
    /// An open or closed polyline.
    LineString(LineString<f64>),
    /// An area with an exterior ring and optional holes.
    Polygon(Polygon<f64>),
}

impl Shape {
    /// Geometry type name as used by GeoJSON.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::LineString(_) => "LineString",
            Self::Polygon(_) => "Polygon",
        }
    }
}

/// Errors produced while validating or comparing geometries.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryError {
    /// A coordinate was NaN or infinite.
    #[error("{kind} contains a non-finite coordinate ({x}, {y})")]
    NonFiniteCoordinate {
        /// Geometry type name.
        kind: &'static str,
        /// Offending x ordinate.
        x: f64,
        /// Offending y ordinate.
        y: f64,
    },
    /// The shape has fewer positions than its type requires.
    #[error("{kind} needs at least {required} positions, found {found}")]
    TooFewPositions {
        /// Geometry type name.
        kind: &'static str,
        /// Minimum number of positions.
        required: usize,
        /// Positions supplied.
        found: usize,
    },
    /// Two geometries in different reference systems were compared.
    #[error("cannot compare geometries in {left} and {right}")]
    CrsMismatch {
        /// Reference system of the left operand.
        left: Crs,
        /// Reference system of the right operand.
        right: Crs,
    },
}

/// A validated geometry tagged with its reference system.
///
/// # Examples
///
/// ```
/// use conflator_core::{Crs, FeatureGeometry};
///
/// # fn main() -> Result<(), conflator_core::GeometryError> {
/// let a = FeatureGeometry::point(Crs::WebMercator, 0.0, 0.0)?;
/// let b = FeatureGeometry::point(Crs::WebMercator, 3.0, 4.0)?;
/// assert_eq!(a.distance_m(&b)?, 5.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FeatureGeometry {
    crs: Crs,
    shape: Shape,
}

impl FeatureGeometry {
    /// Validate and wrap a shape.
    ///
    /// Coordinates must be finite, line strings need two positions and
    /// polygon exterior rings need four (closing position included).
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] describing the first violation found.
    pub fn new(crs: Crs, shape: Shape) -> Result<Self, GeometryError> {
        let kind = shape.kind();
        let (found, required) = match &shape {
            Shape::Point(_) => (1, 1),
            Shape::LineString(line) => (line.0.len(), 2),
            Shape::Polygon(polygon) => (polygon.exterior().0.len(), 4),
        };
        if found < required {
            return Err(GeometryError::TooFewPositions {
                kind,
                required,
                found,
            });
        }
        if let Some(bad) = coords(&shape).find(|c| !(c.x.is_finite() && c.y.is_finite())) {
            return Err(GeometryError::NonFiniteCoordinate {
                kind,
                x: bad.x,
                y: bad.y,
            });
        }
        Ok(Self { crs, shape })
    }

    /// Convenience constructor for point geometries.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::NonFiniteCoordinate`] for NaN or infinite input.
    pub fn point(crs: Crs, x: f64, y: f64) -> Result<Self, GeometryError> {
        Self::new(crs, Shape::Point(Point::new(x, y)))
    }

    /// Reference system of the geometry.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Underlying shape.
    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Geometry type name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.shape.kind()
    }

    /// A point guaranteed to lie on the geometry.
    ///
    /// Points return themselves; lines and polygons use the interior point
    /// nearest their centroid.
    #[must_use]
    pub fn representative_point(&self) -> Point<f64> {
        let interior = match &self.shape {
            Shape::Point(point) => Some(*point),
            Shape::LineString(line) => line.interior_point(),
            Shape::Polygon(polygon) => polygon.interior_point(),
        };
        interior.unwrap_or_else(|| self.first_point())
    }

    /// Axis-aligned bounds of the geometry.
    #[must_use]
    pub fn bounding_rect(&self) -> Rect<f64> {
        let rect = match &self.shape {
            Shape::Point(point) => Some(Rect::new(point.0, point.0)),
            Shape::LineString(line) => line.bounding_rect(),
            Shape::Polygon(polygon) => polygon.bounding_rect(),
        };
        rect.unwrap_or_else(|| {
            let point = self.first_point();
            Rect::new(point.0, point.0)
        })
    }

    /// Metric distance to `other`.
    ///
    /// The distance is the smaller of the two closest-point distances
    /// measured from each geometry's representative point to the other
    /// geometry, so it is symmetric and zero when one geometry contains or
    /// touches the other's representative point.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::CrsMismatch`] when the reference systems differ.
    pub fn distance_m(&self, other: &Self) -> Result<f64, GeometryError> {
        if self.crs != other.crs {
            return Err(GeometryError::CrsMismatch {
                left: self.crs,
                right: other.crs,
            });
        }
        let forward = self.distance_from_point(other.representative_point());
        let backward = other.distance_from_point(self.representative_point());
        Ok(forward.min(backward))
    }

    /// Convert into a plain `geo` geometry.
    #[must_use]
    pub fn to_geo(&self) -> geo::Geometry<f64> {
        match &self.shape {
            Shape::Point(point) => geo::Geometry::Point(*point),
            Shape::LineString(line) => geo::Geometry::LineString(line.clone()),
            Shape::Polygon(polygon) => geo::Geometry::Polygon(polygon.clone()),
        }
    }

    fn distance_from_point(&self, point: Point<f64>) -> f64 {
        let closest = match &self.shape {
            Shape::Point(own) => own.closest_point(&point),
            Shape::LineString(line) => line.closest_point(&point),
            Shape::Polygon(polygon) => polygon.closest_point(&point),
        };
        match closest {
            Closest::Intersection(_) => 0.0,
            Closest::SinglePoint(nearest) => self.crs.metres_between(point, nearest),
            Closest::Indeterminate => self.crs.metres_between(point, self.representative_point()),
        }
    }

    fn first_point(&self) -> Point<f64> {
        // Validated shapes always hold at least one position.
        coords(&self.shape)
            .next()
            .map_or_else(|| Point::new(0.0, 0.0), Point::from)
    }
}

fn coords(shape: &Shape) -> Box<dyn Iterator<Item = Coord<f64>> + '_> {
    match shape {
        Shape::Point(point) => Box::new(std::iter::once(point.0)),
        Shape::LineString(line) => Box::new(line.coords_iter()),
        Shape::Polygon(polygon) => Box::new(polygon.coords_iter()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, polygon};
    use rstest::rstest;

    fn mercator_square() -> FeatureGeometry {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ];
        FeatureGeometry::new(Crs::WebMercator, Shape::Polygon(square)).expect("valid square")
    }

    #[rstest]
    fn rejects_non_finite_points() {
        let err = FeatureGeometry::point(Crs::Wgs84, f64::NAN, 1.0).expect_err("NaN rejected");
        assert!(matches!(err, GeometryError::NonFiniteCoordinate { .. }));
    }

    #[rstest]
    fn rejects_single_position_lines() {
        let line = LineString::from(vec![(0.0, 0.0)]);
        let err = FeatureGeometry::new(Crs::Wgs84, Shape::LineString(line))
            .expect_err("degenerate line rejected");
        assert_eq!(
            err,
            GeometryError::TooFewPositions {
                kind: "LineString",
                required: 2,
                found: 1,
            }
        );
    }

    #[rstest]
    fn point_inside_polygon_has_zero_distance() {
        let point = FeatureGeometry::point(Crs::WebMercator, 5.0, 5.0).expect("point");
        let distance = mercator_square().distance_m(&point).expect("same CRS");
        assert_eq!(distance, 0.0);
    }

    #[rstest]
    fn distance_to_polygon_uses_nearest_edge() {
        let point = FeatureGeometry::point(Crs::WebMercator, 13.0, 5.0).expect("point");
        let square = mercator_square();
        assert_eq!(square.distance_m(&point).expect("same CRS"), 3.0);
        assert_eq!(point.distance_m(&square).expect("same CRS"), 3.0);
    }

    #[rstest]
    fn haversine_distance_is_metric() {
        let a = FeatureGeometry::point(Crs::Wgs84, 0.0, 0.0).expect("a");
        let b = FeatureGeometry::point(Crs::Wgs84, 0.0, 0.001).expect("b");
        let distance = a.distance_m(&b).expect("same CRS");
        assert!((distance - 111.195).abs() < 0.5, "got {distance}");
    }

    #[rstest]
    fn mixed_crs_is_rejected() {
        let a = FeatureGeometry::point(Crs::Wgs84, 0.0, 0.0).expect("a");
        let b = FeatureGeometry::point(Crs::WebMercator, 0.0, 0.0).expect("b");
        assert!(matches!(
            a.distance_m(&b),
            Err(GeometryError::CrsMismatch { .. })
        ));
    }

    #[rstest]
    fn representative_point_lies_on_line() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 0.0)]);
        let geometry =
            FeatureGeometry::new(Crs::WebMercator, Shape::LineString(line)).expect("line");
        let point = geometry.representative_point();
        assert_eq!(point.y(), 0.0);
        assert!((0.0..=10.0).contains(&point.x()));
    }
}
