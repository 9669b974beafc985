//! Automatic classification of matched incoming features.
//!
//! Each incoming feature becomes AutoMerge, AutoCreate or NeedsReview. The
//! resolver works in two passes: the first classifies every feature on its
//! own candidates, the second demotes auto-merges that compete for the same
//! OSM feature so that no OSM feature receives two merges.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::{
    AuditSource, ConfigError, ConflationConfig, Decision, DecisionKind, Feature, FeatureId,
    MatchCandidate, MatchError, MatchedTarget, ResolverRule,
};

/// Tolerance applied to threshold and margin comparisons.
pub const SCORE_EPSILON: f64 = 1e-9;

/// Result of matching one incoming feature, ready for resolution.
#[derive(Debug)]
pub struct MatchOutcome {
    /// The incoming feature.
    pub incoming: Feature,
    /// Ranked candidates, or the error raised while matching.
    pub result: Result<Vec<MatchCandidate>, MatchError>,
}

/// Classification of a single candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Resulting decision kind.
    pub kind: DecisionKind,
    /// Rule that produced it.
    pub rule: ResolverRule,
}

/// Decisions produced by [`AutoResolver::resolve`].
#[derive(Debug, Default)]
pub struct Resolution {
    /// AutoMerge and AutoCreate decisions.
    pub terminal: Vec<Decision>,
    /// Decisions handed to the review queue.
    pub needs_review: Vec<Decision>,
}

impl Resolution {
    /// Number of automatic merges.
    #[must_use]
    pub fn auto_merged(&self) -> usize {
        self.count(DecisionKind::AutoMerge)
    }

    /// Number of automatic creations.
    #[must_use]
    pub fn auto_created(&self) -> usize {
        self.count(DecisionKind::AutoCreate)
    }

    /// Number of decisions waiting for review.
    #[must_use]
    pub const fn review_count(&self) -> usize {
        self.needs_review.len()
    }

    /// Number of review decisions caused by matching errors.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.needs_review
            .iter()
            .filter(|decision| decision.error().is_some())
            .count()
    }

    fn count(&self, kind: DecisionKind) -> usize {
        self.terminal
            .iter()
            .filter(|decision| decision.kind() == kind)
            .count()
    }
}

/// Threshold-based resolver.
///
/// # Examples
///
/// ```
/// use conflator_core::{AutoResolver, DecisionKind};
///
/// let resolver = AutoResolver::new(0.9, 0.05).expect("valid thresholds");
/// assert_eq!(resolver.classify(&[]).kind, DecisionKind::AutoCreate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoResolver {
    merge_threshold: f64,
    ambiguity_margin: f64,
}

impl AutoResolver {
    /// Create a resolver from explicit thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when either value is out of range.
    pub fn new(merge_threshold: f64, ambiguity_margin: f64) -> Result<Self, ConfigError> {
        ConflationConfig::default()
            .with_merge_threshold(merge_threshold)
            .with_ambiguity_margin(ambiguity_margin)
            .validate()?;
        Ok(Self {
            merge_threshold,
            ambiguity_margin,
        })
    }

    /// Create a resolver from session configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is out of range.
    pub fn from_config(config: &ConflationConfig) -> Result<Self, ConfigError> {
        Self::new(config.merge_threshold, config.ambiguity_margin)
    }

    /// Classify one ranked candidate list.
    #[expect(
        clippy::float_arithmetic,
        reason = "threshold and margin comparisons use a tolerance"
    )]
    #[must_use]
    pub fn classify(&self, candidates: &[MatchCandidate]) -> Verdict {
        let Some(top) = candidates.first() else {
            return Verdict {
                kind: DecisionKind::AutoCreate,
                rule: ResolverRule::NoCandidates,
            };
        };
        if top.score.total < self.merge_threshold - SCORE_EPSILON {
            return Verdict {
                kind: DecisionKind::NeedsReview,
                rule: ResolverRule::BelowThreshold,
            };
        }
        let ambiguous = candidates.iter().skip(1).any(|other| {
            top.score.total - other.score.total < self.ambiguity_margin - SCORE_EPSILON
        });
        if ambiguous {
            Verdict {
                kind: DecisionKind::NeedsReview,
                rule: ResolverRule::AmbiguousCandidates,
            }
        } else {
            Verdict {
                kind: DecisionKind::AutoMerge,
                rule: ResolverRule::ConfidentMatch,
            }
        }
    }

    /// Resolve a batch of match outcomes.
    ///
    /// Matching errors become NeedsReview decisions carrying the error text.
    #[must_use]
    pub fn resolve(&self, outcomes: Vec<MatchOutcome>) -> Resolution {
        let mut decisions: Vec<Decision> = outcomes
            .into_iter()
            .map(|outcome| self.first_pass(outcome))
            .collect();
        demote_contested(&mut decisions);

        let mut resolution = Resolution::default();
        for decision in decisions {
            debug!(
                "incoming feature {} resolved as {}",
                decision.incoming_id(),
                decision.kind()
            );
            if decision.kind().is_terminal() {
                resolution.terminal.push(decision);
            } else {
                resolution.needs_review.push(decision);
            }
        }
        info!(
            "resolved {} incoming features: {} auto-merged, {} auto-created, {} for review",
            resolution.terminal.len() + resolution.needs_review.len(),
            resolution.auto_merged(),
            resolution.auto_created(),
            resolution.review_count()
        );
        resolution
    }

    fn first_pass(&self, outcome: MatchOutcome) -> Decision {
        let MatchOutcome { incoming, result } = outcome;
        match result {
            Ok(candidates) => {
                let verdict = self.classify(&candidates);
                let note = self.describe(verdict.rule, &candidates);
                let target = (verdict.kind == DecisionKind::AutoMerge)
                    .then(|| candidates.first())
                    .flatten()
                    .map(|top| MatchedTarget {
                        id: top.osm,
                        generation: top.generation,
                    });
                let mut decision =
                    Decision::new(verdict.kind, incoming, candidates, verdict.rule, note);
                decision.set_target(target);
                decision
            }
            Err(error) => {
                warn!("matching failed for incoming feature {}: {error}", incoming.id());
                let message = error.to_string();
                Decision::new(
                    DecisionKind::NeedsReview,
                    incoming,
                    Vec::new(),
                    ResolverRule::MatchFailed,
                    format!("matching failed: {message}"),
                )
                .with_error(message)
            }
        }
    }

    fn describe(&self, rule: ResolverRule, candidates: &[MatchCandidate]) -> String {
        let top = candidates.first().map_or(0.0, |c| c.score.total);
        let second = candidates.get(1).map(|c| c.score.total);
        match rule {
            ResolverRule::NoCandidates => "no OSM feature within the match radius".to_owned(),
            ResolverRule::BelowThreshold => format!(
                "top score {top:.3} is below merge threshold {:.3}",
                self.merge_threshold
            ),
            ResolverRule::AmbiguousCandidates => format!(
                "top score {top:.3} and runner-up {:.3} are within margin {:.3}",
                second.unwrap_or(0.0),
                self.ambiguity_margin
            ),
            ResolverRule::ConfidentMatch => match second {
                Some(runner_up) => format!(
                    "top score {top:.3} meets merge threshold {:.3} and leads runner-up {runner_up:.3} by at least {:.3}",
                    self.merge_threshold, self.ambiguity_margin
                ),
                None => format!(
                    "top score {top:.3} meets merge threshold {:.3} with no runner-up",
                    self.merge_threshold
                ),
            },
            ResolverRule::ContestedTarget => {
                "best candidate is also the best match of another incoming feature".to_owned()
            }
            ResolverRule::MatchFailed => "matching failed for this feature".to_owned(),
        }
    }
}

fn demote_contested(decisions: &mut [Decision]) {
    let mut claims: HashMap<FeatureId, Vec<FeatureId>> = HashMap::new();
    for decision in decisions.iter() {
        if decision.kind().claims_target()
            && let Some(target) = decision.target()
        {
            claims
                .entry(target.id)
                .or_default()
                .push(decision.incoming_id());
        }
    }
    for decision in decisions.iter_mut() {
        let Some(target) = decision.target() else {
            continue;
        };
        let Some(rivals) = claims.get(&target.id).filter(|rivals| rivals.len() > 1) else {
            continue;
        };
        warn!(
            "OSM feature {} is contested by {} incoming features; sending them to review",
            target.id,
            rivals.len()
        );
        let others: Vec<String> = rivals
            .iter()
            .filter(|id| **id != decision.incoming_id())
            .map(ToString::to_string)
            .collect();
        decision.set_target(None);
        decision.transition(
            DecisionKind::NeedsReview,
            AuditSource::Rule(ResolverRule::ContestedTarget),
            format!(
                "OSM feature {} is also claimed by incoming {}",
                target.id,
                others.join(", ")
            ),
        );
    }
}
