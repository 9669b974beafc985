//! Feature identifiers shared by OSM and incoming datasets.
//!
//! OSM element ids are only unique per element family, so the family is
//! packed into the top two bits of the identifier. Incoming features use the
//! raw value as supplied by their loader.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top two bits encode element type: 00=node, 01=way, 10=relation. Remaining 62 bits carry the raw ID.
const WAY_ID_PREFIX: u64 = 1 << 62;
const REL_ID_PREFIX: u64 = 1 << 63;
const TYPE_ID_MASK: u64 = (1 << 62) - 1;

/// OSM element family carried by an encoded [`FeatureId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum OsmElementKind {
    /// A single tagged node.
    Node,
    /// An ordered list of nodes.
    Way,
    /// A relation between other elements.
    Relation,
}

impl OsmElementKind {
    /// Lowercase name used by the OSM API and in exported properties.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    const fn prefix(self) -> u64 {
        match self {
            Self::Node => 0,
            Self::Way => WAY_ID_PREFIX,
            Self::Relation => REL_ID_PREFIX,
        }
    }
}

impl fmt::Display for OsmElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when packing an OSM element id.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum FeatureIdError {
    /// OSM ids are positive; negative ids denote unsaved editor objects.
    #[error("negative {kind} id {raw_id} is unsupported")]
    Negative {
        /// Element family of the rejected id.
        kind: OsmElementKind,
        /// Identifier as supplied.
        raw_id: i64,
    },
    /// The id does not fit in the 62 bits left after the family prefix.
    #[error("{kind} id {raw_id} exceeds supported maximum {max}")]
    OutOfRange {
        /// Element family of the rejected id.
        kind: OsmElementKind,
        /// Identifier as supplied.
        raw_id: i64,
        /// Largest id that can be encoded.
        max: u64,
    },
}

/// Stable identifier of a feature.
///
/// Identifiers are totally ordered; ties between equally scored candidates
/// are broken in favour of the smaller id.
///
/// # Examples
///
/// ```
/// use conflator_core::{FeatureId, OsmElementKind};
///
/// # fn main() -> Result<(), conflator_core::FeatureIdError> {
/// let way = FeatureId::osm(OsmElementKind::Way, 42)?;
/// assert_eq!(way.osm_kind(), OsmElementKind::Way);
/// assert_eq!(way.osm_raw_id(), 42);
/// assert_eq!(way.osm_label(), "way/42");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct FeatureId(u64);

impl FeatureId {
    /// Wrap a raw identifier without interpretation.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Pack an OSM element id together with its element family.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureIdError`] when the id is negative or too large.
    pub fn osm(kind: OsmElementKind, raw_id: i64) -> Result<Self, FeatureIdError> {
        let base = u64::try_from(raw_id).map_err(|_| FeatureIdError::Negative { kind, raw_id })?;
        if base > TYPE_ID_MASK {
            return Err(FeatureIdError::OutOfRange {
                kind,
                raw_id,
                max: TYPE_ID_MASK,
            });
        }
        Ok(Self(kind.prefix() | base))
    }

    /// The underlying value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Element family, assuming the id was packed by [`FeatureId::osm`].
    #[must_use]
    pub const fn osm_kind(self) -> OsmElementKind {
        if self.0 & REL_ID_PREFIX != 0 {
            OsmElementKind::Relation
        } else if self.0 & WAY_ID_PREFIX != 0 {
            OsmElementKind::Way
        } else {
            OsmElementKind::Node
        }
    }

    /// OSM id with the family prefix stripped.
    #[must_use]
    pub const fn osm_raw_id(self) -> u64 {
        self.0 & TYPE_ID_MASK
    }

    /// `kind/id` label as used by the OSM website.
    #[must_use]
    pub fn osm_label(self) -> String {
        format!("{}/{}", self.osm_kind(), self.osm_raw_id())
    }
}

impl From<u64> for FeatureId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OsmElementKind::Node, 7, 7)]
    #[case(OsmElementKind::Way, 7, WAY_ID_PREFIX | 7)]
    #[case(OsmElementKind::Relation, 7, REL_ID_PREFIX | 7)]
    fn packs_element_family(#[case] kind: OsmElementKind, #[case] raw: i64, #[case] packed: u64) {
        let id = FeatureId::osm(kind, raw).expect("valid id");
        assert_eq!(id.get(), packed);
        assert_eq!(id.osm_kind(), kind);
        assert_eq!(id.osm_raw_id(), 7);
    }

    #[rstest]
    fn rejects_negative_ids() {
        let err = FeatureId::osm(OsmElementKind::Node, -1).expect_err("negative id");
        assert!(matches!(err, FeatureIdError::Negative { raw_id: -1, .. }));
    }

    #[rstest]
    fn rejects_ids_overflowing_the_prefix() {
        let raw = i64::try_from(TYPE_ID_MASK + 1).expect("fits in i64");
        let err = FeatureId::osm(OsmElementKind::Way, raw).expect_err("too large");
        assert!(matches!(err, FeatureIdError::OutOfRange { .. }));
    }

    #[rstest]
    fn nodes_order_before_ways_with_the_same_raw_id() {
        let node = FeatureId::osm(OsmElementKind::Node, 100).expect("node");
        let way = FeatureId::osm(OsmElementKind::Way, 1).expect("way");
        assert!(node < way);
    }
}
