//! Behaviour-driven step definitions driving the conflate CLI scenarios.

use super::helpers::InputFiles;
use super::*;
use crate::conflate::{
    CHANGES_FILE, ConflateConfig, ConflateReport, REVIEW_FILE, config_from_layers_for_test,
    execute_conflate,
};
use ortho_config::MergeComposer;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};
use std::cell::RefCell;

/// Aggregates conflate scenario state so each step takes a single world.
#[derive(Debug)]
struct ConflateWorld {
    files: InputFiles,
    cli_args: RefCell<Vec<String>>,
    env_layer: RefCell<Option<Value>>,
    outcome: RefCell<Option<Result<ConflateReport, CliError>>>,
}

impl ConflateWorld {
    fn new() -> Self {
        Self {
            files: InputFiles::new(),
            cli_args: RefCell::new(Vec::new()),
            env_layer: RefCell::new(None),
            outcome: RefCell::new(None),
        }
    }

    fn report(&self) -> ConflateReport {
        self.outcome
            .borrow()
            .as_ref()
            .expect("result recorded")
            .as_ref()
            .expect("expected success")
            .clone()
    }
}

/// Keep only the flags that were set, as the CLI layer does.
fn cli_layer(args: &ConflateArgs) -> Value {
    let mut value = serde_json::to_value(args).expect("serialise CLI args");
    if let Value::Object(map) = &mut value {
        map.retain(|_, field| !field.is_null());
    }
    value
}

fn resolve(args: ConflateArgs, env_layer: Option<Value>) -> Result<ConflateConfig, CliError> {
    match env_layer {
        None => args.into_config(),
        Some(env) => {
            let mut composer = MergeComposer::new();
            composer.push_environment(env);
            composer.push_cli(cli_layer(&args));
            config_from_layers_for_test(composer.layers())
        }
    }
}

#[fixture]
fn world() -> ConflateWorld {
    ConflateWorld::new()
}

#[given("an OSM snapshot and an incoming dataset on disk")]
fn inputs_on_disk(#[from(world)] world: &ConflateWorld) {
    world.cli_args.borrow_mut().extend([
        format!("--{ARG_OSM}"),
        world.files.osm().into_string(),
        format!("--{ARG_INCOMING}"),
        world.files.incoming().into_string(),
    ]);
}

#[given("an incoming dataset but no OSM snapshot flag")]
fn incoming_only(#[from(world)] world: &ConflateWorld) {
    world.cli_args.borrow_mut().extend([
        format!("--{ARG_INCOMING}"),
        world.files.incoming().into_string(),
    ]);
}

#[given("the environment layer raises the merge threshold to 1")]
fn strict_threshold(#[from(world)] world: &ConflateWorld) {
    world
        .env_layer
        .replace(Some(json!({ "merge_threshold": 1.0 })));
}

#[when("I run the conflate command with an output directory")]
fn run_conflate_command(#[from(world)] world: &ConflateWorld) {
    let mut invocation = vec!["osm-conflator".to_owned(), "conflate".to_owned()];
    invocation.extend(world.cli_args.borrow().iter().cloned());
    invocation.extend([
        "--output-dir".to_owned(),
        world.files.output_dir().into_string(),
    ]);
    let env_layer = world.env_layer.borrow().clone();
    let outcome = Cli::try_parse_from(invocation)
        .map_err(CliError::ArgumentParsing)
        .and_then(|cli| match cli.command {
            Command::Conflate(args) => resolve(args, env_layer),
            Command::Query(_) => panic!("expected the conflate command"),
        })
        .and_then(|config| {
            config.validate_sources()?;
            execute_conflate(&config)
        });
    world.outcome.replace(Some(outcome));
}

#[then("the summary reports 1 merge, 1 creation and 1 review item")]
fn one_of_each(#[from(world)] world: &ConflateWorld) {
    let report = world.report();
    assert_eq!(report.summary.auto_merged, 1);
    assert_eq!(report.summary.auto_created, 1);
    assert_eq!(report.summary.needs_review, 1);
}

#[then("the summary reports 0 merges, 1 creation and 2 review items")]
fn nothing_merged(#[from(world)] world: &ConflateWorld) {
    let report = world.report();
    assert_eq!(report.summary.auto_merged, 0);
    assert_eq!(report.summary.auto_created, 1);
    assert_eq!(report.summary.needs_review, 2);
}

#[then("the output directory holds the changes and review files")]
fn outputs_written(#[from(world)] world: &ConflateWorld) {
    let output_dir = world.files.output_dir();
    for name in [CHANGES_FILE, REVIEW_FILE] {
        let path = output_dir.join(name);
        assert!(
            conflator_fs::is_regular_file(&path).expect("stat output"),
            "expected {path} to be written"
        );
    }
}

#[then("the CLI reports that the \"osm\" flag is missing")]
fn reports_missing_osm(#[from(world)] world: &ConflateWorld) {
    let borrowed = world.outcome.borrow();
    let error = borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect_err("expected error");
    match error {
        CliError::MissingArgument { field, .. } => assert_eq!(*field, ARG_OSM),
        other => panic!("unexpected error {other:?}"),
    }
}

macro_rules! register_conflate_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/conflate_command.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: ConflateWorld) {
            let _ = world;
        }
    };
}

register_conflate_scenario!(
    conflating_inputs,
    "conflating a snapshot with an incoming dataset"
);
register_conflate_scenario!(rejecting_missing_snapshot, "rejecting a missing snapshot path");
register_conflate_scenario!(
    layering_environment_thresholds,
    "layering thresholds from the environment"
);
