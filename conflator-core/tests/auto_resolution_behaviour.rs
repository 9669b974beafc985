//! Behavioural tests for automatic conflation using rstest-bdd.

use std::cell::RefCell;

use conflator_core::{
    AutoResolver, Crs, DecisionKind, Feature, FeatureGeometry, FeatureId, MatchCandidate,
    MatchOutcome, MatchScore, Resolution, Tags,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

#[expect(clippy::expect_used, reason = "fixture coordinates are finite literals")]
fn incoming_point(id: u64) -> Feature {
    let geometry = FeatureGeometry::point(Crs::Wgs84, 0.0, 0.0).expect("finite coordinates");
    Feature::incoming(FeatureId::new(id), geometry, Tags::new())
}

fn candidate(incoming: u64, osm: u64, total: f64) -> MatchCandidate {
    MatchCandidate {
        incoming: FeatureId::new(incoming),
        osm: FeatureId::new(osm),
        score: MatchScore {
            geometry: total,
            attribute: total,
            total,
        },
        distance_m: 0.0,
        rank: 0,
        generation: 0,
    }
}

#[derive(Debug)]
struct ResolverWorld {
    resolver: RefCell<Option<AutoResolver>>,
    outcomes: RefCell<Vec<MatchOutcome>>,
    resolution: RefCell<Option<Resolution>>,
}

impl ResolverWorld {
    fn new() -> Self {
        Self {
            resolver: RefCell::new(None),
            outcomes: RefCell::new(Vec::new()),
            resolution: RefCell::new(None),
        }
    }

    fn push_incoming(&self, id: u64, scores: &[(u64, f64)]) {
        let candidates = scores
            .iter()
            .map(|(osm, score)| candidate(id, *osm, *score))
            .collect();
        self.outcomes.borrow_mut().push(MatchOutcome {
            incoming: incoming_point(id),
            result: Ok(candidates),
        });
    }

    #[expect(
        clippy::expect_used,
        reason = "behaviour tests use expect for readable failures"
    )]
    fn only_kind(&self) -> DecisionKind {
        let resolution = self.resolution.borrow();
        let resolution = resolution
            .as_ref()
            .expect("batch should be resolved before assertions");
        let mut kinds = resolution
            .terminal
            .iter()
            .chain(&resolution.needs_review)
            .map(conflator_core::Decision::kind);
        let kind = kinds.next().expect("one decision");
        assert!(kinds.next().is_none(), "expected a single decision");
        kind
    }
}

#[fixture]
fn world() -> ResolverWorld {
    ResolverWorld::new()
}

#[given("a resolver with merge threshold 0.9 and ambiguity margin 0.05")]
#[expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]
fn given_resolver(world: &ResolverWorld) {
    let resolver = AutoResolver::new(0.9, 0.05).expect("valid thresholds");
    world.resolver.replace(Some(resolver));
}

#[given("an incoming feature whose candidates score 0.95 and 0.90")]
fn given_clear_winner(world: &ResolverWorld) {
    world.push_incoming(1, &[(10, 0.95), (11, 0.90)]);
}

#[given("an incoming feature whose candidates score 0.95 and 0.92")]
fn given_close_runner_up(world: &ResolverWorld) {
    world.push_incoming(1, &[(10, 0.95), (11, 0.92)]);
}

#[given("an incoming feature with no candidates")]
fn given_no_candidates(world: &ResolverWorld) {
    world.push_incoming(1, &[]);
}

#[given("two incoming features that both score 0.97 against the same OSM feature")]
fn given_contested_target(world: &ResolverWorld) {
    world.push_incoming(1, &[(10, 0.97)]);
    world.push_incoming(2, &[(10, 0.97)]);
}

#[when("the batch is resolved")]
#[expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]
fn when_resolved(world: &ResolverWorld) {
    let resolver = world.resolver.borrow().expect("resolver configured");
    let outcomes = world.outcomes.take();
    world.resolution.replace(Some(resolver.resolve(outcomes)));
}

#[then("the incoming feature is merged automatically")]
fn then_merged(world: &ResolverWorld) {
    assert_eq!(world.only_kind(), DecisionKind::AutoMerge);
}

#[then("the incoming feature needs review")]
fn then_needs_review(world: &ResolverWorld) {
    assert_eq!(world.only_kind(), DecisionKind::NeedsReview);
}

#[then("the incoming feature is created automatically")]
fn then_created(world: &ResolverWorld) {
    assert_eq!(world.only_kind(), DecisionKind::AutoCreate);
}

#[then("both incoming features need review")]
#[expect(
    clippy::expect_used,
    reason = "behaviour tests use expect for readable failures"
)]
fn then_both_reviewed(world: &ResolverWorld) {
    let resolution = world.resolution.borrow();
    let resolution = resolution.as_ref().expect("batch resolved");
    assert!(resolution.terminal.is_empty());
    assert_eq!(resolution.review_count(), 2);
}

#[scenario(path = "tests/features/auto_resolution.feature", index = 0)]
fn clear_winner(world: ResolverWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/auto_resolution.feature", index = 1)]
fn close_runner_up(world: ResolverWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/auto_resolution.feature", index = 2)]
fn no_candidates(world: ResolverWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/auto_resolution.feature", index = 3)]
fn contested_target(world: ResolverWorld) {
    let _ = world;
}
