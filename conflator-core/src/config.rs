//! Tunable thresholds and weights for a conflation run.
//!
//! Every threshold the engine relies on is explicit configuration. Values are
//! checked once by [`ConflationConfig::validate`] before a session starts.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a Modify operation chooses its geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub enum GeometryPolicy {
    /// Keep the geometry already mapped in OSM.
    #[default]
    KeepOsm,
    /// Replace the OSM geometry with the incoming one.
    PreferIncoming,
}

/// Errors returned by [`ConflationConfig::validate`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// The merge threshold must lie in `[0, 1]`.
    #[error("merge threshold must be within [0, 1], got {value}")]
    MergeThreshold {
        /// Rejected value.
        value: f64,
    },
    /// The ambiguity margin must be finite and non-negative.
    #[error("ambiguity margin must be finite and non-negative, got {value}")]
    AmbiguityMargin {
        /// Rejected value.
        value: f64,
    },
    /// The match radius must be finite and positive.
    #[error("max match radius must be finite and positive, got {value}")]
    MatchRadius {
        /// Rejected value.
        value: f64,
    },
    /// A tag weight was negative or non-finite.
    #[error("weight for tag `{key}` must be finite and non-negative, got {value}")]
    TagWeight {
        /// Tag key the weight applies to.
        key: String,
        /// Rejected value.
        value: f64,
    },
    /// The fallback tag weight was negative or non-finite.
    #[error("default tag weight must be finite and non-negative, got {value}")]
    DefaultTagWeight {
        /// Rejected value.
        value: f64,
    },
    /// The geometry weight must lie in `[0, 1]`.
    #[error("geometry weight must be within [0, 1], got {value}")]
    GeometryWeight {
        /// Rejected value.
        value: f64,
    },
}

/// Configuration shared by the matcher, resolver and change builder.
///
/// # Examples
///
/// ```
/// use conflator_core::ConflationConfig;
///
/// let config = ConflationConfig::default()
///     .with_merge_threshold(0.9)
///     .with_tag_weight("ref", 2.0);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.tag_weight("ref"), 2.0);
/// assert_eq!(config.tag_weight("colour"), config.default_tag_weight);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct ConflationConfig {
    /// Minimum top score required for an automatic merge.
    pub merge_threshold: f64,
    /// Score gap below which the runner-up makes a match ambiguous.
    pub ambiguity_margin: f64,
    /// Candidate search radius in metres.
    pub max_match_radius: f64,
    /// Per-key weights used by the attribute score.
    pub tag_weights: BTreeMap<String, f64>,
    /// Weight for keys missing from `tag_weights`.
    pub default_tag_weight: f64,
    /// Share of the total score taken by the geometry score.
    pub geometry_weight: f64,
    /// Geometry choice for Modify operations.
    pub geometry_policy: GeometryPolicy,
}

impl Default for ConflationConfig {
    fn default() -> Self {
        let tag_weights = [
            ("name", 3.0),
            ("building", 1.0),
            ("addr:housenumber", 2.0),
            ("addr:street", 2.0),
            ("amenity", 1.0),
            ("shop", 1.0),
        ]
        .into_iter()
        .map(|(key, weight)| (key.to_owned(), weight))
        .collect();
        Self {
            merge_threshold: 0.8,
            ambiguity_margin: 0.05,
            max_match_radius: 50.0,
            tag_weights,
            default_tag_weight: 0.5,
            geometry_weight: 0.5,
            geometry_policy: GeometryPolicy::KeepOsm,
        }
    }
}

impl ConflationConfig {
    /// Set the merge threshold.
    #[must_use]
    pub const fn with_merge_threshold(mut self, value: f64) -> Self {
        self.merge_threshold = value;
        self
    }

    /// Set the ambiguity margin.
    #[must_use]
    pub const fn with_ambiguity_margin(mut self, value: f64) -> Self {
        self.ambiguity_margin = value;
        self
    }

    /// Set the candidate radius in metres.
    #[must_use]
    pub const fn with_max_match_radius(mut self, value: f64) -> Self {
        self.max_match_radius = value;
        self
    }

    /// Set the weight for one tag key.
    #[must_use]
    pub fn with_tag_weight(mut self, key: impl Into<String>, weight: f64) -> Self {
        self.tag_weights.insert(key.into(), weight);
        self
    }

    /// Set the fallback tag weight.
    #[must_use]
    pub const fn with_default_tag_weight(mut self, value: f64) -> Self {
        self.default_tag_weight = value;
        self
    }

    /// Set the geometry share of the total score.
    #[must_use]
    pub const fn with_geometry_weight(mut self, value: f64) -> Self {
        self.geometry_weight = value;
        self
    }

    /// Set the Modify geometry policy.
    #[must_use]
    pub const fn with_geometry_policy(mut self, policy: GeometryPolicy) -> Self {
        self.geometry_policy = policy;
        self
    }

    /// Weight applied to `key` by the attribute score.
    #[must_use]
    pub fn tag_weight(&self, key: &str) -> f64 {
        self.tag_weights
            .get(key)
            .copied()
            .unwrap_or(self.default_tag_weight)
    }

    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_unit(self.merge_threshold) {
            return Err(ConfigError::MergeThreshold {
                value: self.merge_threshold,
            });
        }
        if !is_non_negative(self.ambiguity_margin) {
            return Err(ConfigError::AmbiguityMargin {
                value: self.ambiguity_margin,
            });
        }
        if !(self.max_match_radius.is_finite() && self.max_match_radius > 0.0) {
            return Err(ConfigError::MatchRadius {
                value: self.max_match_radius,
            });
        }
        if let Some((key, value)) = self
            .tag_weights
            .iter()
            .find(|(_, weight)| !is_non_negative(**weight))
        {
            return Err(ConfigError::TagWeight {
                key: key.clone(),
                value: *value,
            });
        }
        if !is_non_negative(self.default_tag_weight) {
            return Err(ConfigError::DefaultTagWeight {
                value: self.default_tag_weight,
            });
        }
        if !is_unit(self.geometry_weight) {
            return Err(ConfigError::GeometryWeight {
                value: self.geometry_weight,
            });
        }
        Ok(())
    }
}

fn is_unit(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
