//! End-to-end orchestration of one conflation run.
//!
//! A session owns the spatial index over the OSM snapshot, matches incoming
//! features in parallel, resolves them, and hands undecided ones to the
//! shared [`ReviewQueue`]. Once every review item is settled, [`finish`]
//! builds the change set.
//!
//! [`finish`]: ConflationSession::finish

use std::collections::HashSet;
use std::sync::Arc;

use log::info;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::Serialize;
use thiserror::Error;

use crate::{
    AutoResolver, ChangeBuilder, ChangeError, ChangeSet, ConfigError, ConflationConfig, Decision,
    Feature, FeatureId, IndexError, MatchCandidate, MatchError, MatchOutcome,
    Matcher, ReviewError, ReviewQueue, SpatialIndex, WeightedMatcher,
};

/// Errors raised by [`ConflationSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The OSM snapshot could not be indexed.
    #[error("spatial index error: {0}")]
    Index(#[from] IndexError),
    /// Two incoming features shared an id.
    #[error("incoming feature {id} appears more than once")]
    DuplicateIncoming {
        /// Repeated identifier.
        id: FeatureId,
    },
    /// `run` was called a second time.
    #[error("conflation has already run in this session")]
    AlreadyRun,
    /// Review items remain.
    #[error("{count} review item(s) are still pending")]
    PendingReviews {
        /// Number of pending items.
        count: usize,
    },
    /// Building the change set failed.
    #[error("failed to build changes: {0}")]
    Change(#[from] ChangeError),
    /// Seeding the review queue failed.
    #[error("review queue error: {0}")]
    Review(#[from] ReviewError),
}

/// Counts reported by [`ConflationSession::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(rename_all = "camelCase")
)]
pub struct RunSummary {
    /// Incoming features processed.
    pub incoming: usize,
    /// Confident automatic merges.
    pub auto_merged: usize,
    /// Automatic creations.
    pub auto_created: usize,
    /// Items handed to the review queue.
    pub needs_review: usize,
    /// Review items caused by matching errors.
    pub failed: usize,
}

/// A conflation run over one OSM snapshot and one incoming dataset.
///
/// # Examples
///
/// ```
/// use conflator_core::{
///     ConflationConfig, ConflationSession, Crs, Feature, FeatureGeometry, FeatureId, Tags,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = ConflationSession::new(ConflationConfig::default())?;
/// session.load_osm(Vec::new())?;
/// let shop = Feature::incoming(
///     FeatureId::new(1),
///     FeatureGeometry::point(Crs::Wgs84, -0.1, 51.5)?,
///     Tags::new(),
/// );
/// let summary = session.run(vec![shop])?;
/// assert_eq!(summary.auto_created, 1);
/// let changes = session.finish()?;
/// assert_eq!(changes.ops.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConflationSession<M = WeightedMatcher> {
    config: ConflationConfig,
    index: SpatialIndex,
    matcher: M,
    resolver: AutoResolver,
    queue: Arc<ReviewQueue>,
    terminal: Vec<Decision>,
    has_run: bool,
}

impl ConflationSession<WeightedMatcher> {
    /// Start a session with the default weighted matcher.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when the configuration is invalid.
    pub fn new(config: ConflationConfig) -> Result<Self, SessionError> {
        let matcher = WeightedMatcher::new(config.clone())?;
        Self::with_matcher(config, matcher)
    }
}

impl<M: Matcher> ConflationSession<M> {
    /// Start a session with a custom matcher.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when the configuration is invalid.
    pub fn with_matcher(config: ConflationConfig, matcher: M) -> Result<Self, SessionError> {
        config.validate()?;
        let resolver = AutoResolver::from_config(&config)?;
        Ok(Self {
            config,
            index: SpatialIndex::new(),
            matcher,
            resolver,
            queue: Arc::new(ReviewQueue::new()),
            terminal: Vec::new(),
            has_run: false,
        })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ConflationConfig {
        &self.config
    }

    /// Spatial index over the OSM snapshot.
    #[must_use]
    pub const fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Index the OSM snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Index`] if the features cannot be indexed.
    pub fn load_osm<I>(&mut self, features: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = Feature>,
    {
        self.index.build(features)?;
        info!("indexed {} OSM features", self.index.len());
        Ok(())
    }

    /// Insert or replace OSM features after loading.
    ///
    /// Decisions matched against an older version of a feature become stale.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Index`] for the first feature rejected.
    pub fn update_osm<I>(&mut self, features: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = Feature>,
    {
        for feature in features {
            self.index.upsert(feature)?;
        }
        Ok(())
    }

    /// Remove OSM features after loading.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Index`] before the snapshot is loaded.
    pub fn remove_osm<I>(&mut self, ids: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = FeatureId>,
    {
        for id in ids {
            self.index.remove(id)?;
        }
        Ok(())
    }

    /// Match, resolve and queue every incoming feature.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyRun`] on a second call,
    /// [`SessionError::Index`] before the snapshot is loaded and
    /// [`SessionError::DuplicateIncoming`] for repeated ids.
    pub fn run(&mut self, incoming: Vec<Feature>) -> Result<RunSummary, SessionError> {
        if self.has_run {
            return Err(SessionError::AlreadyRun);
        }
        if !self.index.is_built() {
            return Err(IndexError::NotBuilt.into());
        }
        let mut seen = HashSet::with_capacity(incoming.len());
        if let Some(duplicate) = incoming.iter().find(|feature| !seen.insert(feature.id())) {
            return Err(SessionError::DuplicateIncoming {
                id: duplicate.id(),
            });
        }

        let total = incoming.len();
        let outcomes: Vec<MatchOutcome> = incoming
            .into_par_iter()
            .map(|feature| {
                let result = self.match_one(&feature);
                MatchOutcome {
                    incoming: feature,
                    result,
                }
            })
            .collect();
        let resolution = self.resolver.resolve(outcomes);

        let summary = RunSummary {
            incoming: total,
            auto_merged: resolution.auto_merged(),
            auto_created: resolution.auto_created(),
            needs_review: resolution.review_count(),
            failed: resolution.failed(),
        };
        for decision in &resolution.terminal {
            if decision.kind().claims_target()
                && let Some(target) = decision.target()
            {
                self.queue.claim(target.id, decision.incoming_id());
            }
        }
        for decision in resolution.needs_review {
            self.queue.enqueue(decision)?;
        }
        self.terminal = resolution.terminal;
        self.has_run = true;
        info!(
            "conflation run: {} incoming, {} auto-merged, {} auto-created, {} for review ({} failed)",
            summary.incoming,
            summary.auto_merged,
            summary.auto_created,
            summary.needs_review,
            summary.failed
        );
        Ok(summary)
    }

    fn match_one(&self, feature: &Feature) -> Result<Vec<MatchCandidate>, MatchError> {
        let nearby = self
            .index
            .query(feature.geometry(), self.config.max_match_radius)?;
        self.matcher.match_feature(feature, &nearby)
    }

    /// Shared handle to the review queue.
    #[must_use]
    pub fn review_queue(&self) -> Arc<ReviewQueue> {
        Arc::clone(&self.queue)
    }

    /// Automatic decisions kept by the last run.
    #[must_use]
    pub fn decisions(&self) -> &[Decision] {
        &self.terminal
    }

    /// Build changes for every decision settled so far without consuming
    /// the session.
    ///
    /// Pending review items are left out.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeError`] when a settled decision cannot be applied.
    pub fn preview_changes(&self) -> Result<ChangeSet, ChangeError> {
        let mut decisions = self.terminal.clone();
        decisions.extend(self.queue.resolved());
        ChangeBuilder::new(&self.index, self.config.geometry_policy).build(decisions)
    }

    /// Build the final change set.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::PendingReviews`] while review items remain and
    /// [`SessionError::Change`] when the change set cannot be built.
    pub fn finish(self) -> Result<ChangeSet, SessionError> {
        let count = self.queue.pending_count();
        if count > 0 {
            return Err(SessionError::PendingReviews { count });
        }
        let mut decisions = self.terminal;
        decisions.extend(self.queue.take_resolved());
        let changes =
            ChangeBuilder::new(&self.index, self.config.geometry_policy).build(decisions)?;
        Ok(changes)
    }
}
