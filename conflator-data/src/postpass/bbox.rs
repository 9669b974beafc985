//! WGS84 bounding boxes entered as `min_lon,min_lat,max_lon,max_lat`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Reasons a bounding box string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundingBoxError {
    /// The input was empty or only whitespace.
    #[error("enter a bounding box in the form min_lon,min_lat,max_lon,max_lat")]
    Missing,
    /// The input did not contain exactly four values.
    #[error("bounding box must have exactly four comma-separated values, found {found}")]
    WrongArity {
        /// Number of comma-separated parts supplied.
        found: usize,
    },
    /// A part could not be parsed as a finite number.
    #[error("bounding box value {value:?} is not a finite number")]
    NotNumeric {
        /// The offending part, trimmed.
        value: String,
    },
    /// A minimum was not strictly less than its maximum.
    #[error("bounding box min values must be less than max values")]
    Inverted,
}

/// A validated WGS84 bounding box with `min < max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl BoundingBox {
    /// Validate the four edges of a box.
    ///
    /// # Errors
    ///
    /// Returns [`BoundingBoxError::NotNumeric`] for NaN or infinite edges and
    /// [`BoundingBoxError::Inverted`] when a minimum is not below its maximum.
    pub fn new(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Self, BoundingBoxError> {
        if let Some(bad) = [min_lon, min_lat, max_lon, max_lat]
            .into_iter()
            .find(|value| !value.is_finite())
        {
            return Err(BoundingBoxError::NotNumeric {
                value: bad.to_string(),
            });
        }
        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(BoundingBoxError::Inverted);
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Western edge.
    #[must_use]
    pub const fn min_lon(&self) -> f64 {
        self.min_lon
    }

    /// Southern edge.
    #[must_use]
    pub const fn min_lat(&self) -> f64 {
        self.min_lat
    }

    /// Eastern edge.
    #[must_use]
    pub const fn max_lon(&self) -> f64 {
        self.max_lon
    }

    /// Northern edge.
    #[must_use]
    pub const fn max_lat(&self) -> f64 {
        self.max_lat
    }
}

impl FromStr for BoundingBox {
    type Err = BoundingBoxError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(BoundingBoxError::Missing);
        }
        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let [min_lon, min_lat, max_lon, max_lat] = parts.as_slice() else {
            return Err(BoundingBoxError::WrongArity { found: parts.len() });
        };
        Self::new(
            parse_edge(min_lon)?,
            parse_edge(min_lat)?,
            parse_edge(max_lon)?,
            parse_edge(max_lat)?,
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

fn parse_edge(part: &str) -> Result<f64, BoundingBoxError> {
    part.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| BoundingBoxError::NotNumeric {
            value: part.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn parses_trimmed_values() {
        let bbox: BoundingBox = " 13.3, 52.4 ,13.5,52.6 ".parse().expect("valid bbox");
        assert_eq!(bbox.min_lon(), 13.3);
        assert_eq!(bbox.min_lat(), 52.4);
        assert_eq!(bbox.max_lon(), 13.5);
        assert_eq!(bbox.max_lat(), 52.6);
        assert_eq!(bbox.to_string(), "13.3,52.4,13.5,52.6");
    }

    #[rstest]
    #[case("", BoundingBoxError::Missing)]
    #[case("   ", BoundingBoxError::Missing)]
    #[case("1,2,3", BoundingBoxError::WrongArity { found: 3 })]
    #[case("1,2,3,4,5", BoundingBoxError::WrongArity { found: 5 })]
    #[case("1,two,3,4", BoundingBoxError::NotNumeric { value: "two".to_owned() })]
    #[case("1,2,inf,4", BoundingBoxError::NotNumeric { value: "inf".to_owned() })]
    #[case("1,,3,4", BoundingBoxError::NotNumeric { value: String::new() })]
    #[case("3,2,1,4", BoundingBoxError::Inverted)]
    #[case("1,4,3,4", BoundingBoxError::Inverted)]
    fn rejects_malformed_input(#[case] text: &str, #[case] expected: BoundingBoxError) {
        assert_eq!(text.parse::<BoundingBox>(), Err(expected));
    }
}
