//! `conflate` command: load two GeoJSON files, run automatic conflation and
//! write the results.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use conflator_core::{ConflationConfig, ConflationSession, RunSummary};
use conflator_data::{
    LoadOptions, load_incoming_geojson, load_osm_geojson, write_changes_geojson,
    write_review_geojson,
};
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{ARG_INCOMING, ARG_OSM, CliError, ENV_INCOMING, ENV_OSM};

/// File name of the change operations written to the output directory.
pub const CHANGES_FILE: &str = "changes.geojson";
/// File name of the pending review items written to the output directory.
pub const REVIEW_FILE: &str = "review.geojson";

/// CLI arguments for the `conflate` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Conflate an incoming GeoJSON dataset against an OSM snapshot \
                 exported from PostPass. Confident merges and creations are \
                 written to changes.geojson; everything that needs a human \
                 decision is written to review.geojson. A JSON run summary is \
                 printed to stdout.",
    about = "Conflate an incoming dataset against an OSM snapshot"
)]
#[ortho_config(prefix = "OSM_CONFLATOR")]
pub(crate) struct ConflateArgs {
    /// Path to the OSM snapshot (PostPass GeoJSON).
    #[arg(long = ARG_OSM, value_name = "path")]
    #[serde(default)]
    pub(crate) osm: Option<Utf8PathBuf>,
    /// Path to the incoming GeoJSON dataset.
    #[arg(long = ARG_INCOMING, value_name = "path")]
    #[serde(default)]
    pub(crate) incoming: Option<Utf8PathBuf>,
    /// Directory receiving changes.geojson and review.geojson.
    #[arg(long = "output-dir", value_name = "dir")]
    #[serde(default)]
    pub(crate) output_dir: Option<Utf8PathBuf>,
    /// Minimum score for an automatic merge.
    #[arg(long = "merge-threshold", value_name = "score")]
    #[serde(default)]
    pub(crate) merge_threshold: Option<f64>,
    /// Minimum lead of the best candidate over the runner-up.
    #[arg(long = "ambiguity-margin", value_name = "score")]
    #[serde(default)]
    pub(crate) ambiguity_margin: Option<f64>,
    /// Search radius for candidates, in metres.
    #[arg(long = "max-match-radius", value_name = "metres")]
    #[serde(default)]
    pub(crate) max_match_radius: Option<f64>,
    /// Share of the total score taken by geometry, between 0 and 1.
    #[arg(long = "geometry-weight", value_name = "weight")]
    #[serde(default)]
    pub(crate) geometry_weight: Option<f64>,
    /// Weight of one tag key in attribute scoring; repeatable.
    #[arg(long = "tag-weight", value_name = "key=weight")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) tag_weight: Vec<String>,
    /// Property holding incoming feature ids.
    #[arg(long = "id-property", value_name = "name")]
    #[serde(default)]
    pub(crate) id_property: Option<String>,
}

impl ConflateArgs {
    pub(crate) fn into_config(self) -> Result<ConflateConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ConflateConfig::try_from(merged)
    }
}

/// Resolved `conflate` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConflateConfig {
    pub(crate) osm: Utf8PathBuf,
    pub(crate) incoming: Utf8PathBuf,
    pub(crate) output_dir: Utf8PathBuf,
    pub(crate) conflation: ConflationConfig,
    pub(crate) load: LoadOptions,
}

impl ConflateConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        Self::require_existing(&self.osm, ARG_OSM)?;
        Self::require_existing(&self.incoming, ARG_INCOMING)?;
        Ok(())
    }

    fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        match conflator_fs::is_regular_file(path) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            }),
            Err(source) => Err(CliError::InspectSourcePath {
                field,
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl TryFrom<ConflateArgs> for ConflateConfig {
    type Error = CliError;

    fn try_from(args: ConflateArgs) -> Result<Self, Self::Error> {
        let osm = args.osm.ok_or(CliError::MissingArgument {
            field: ARG_OSM,
            env: ENV_OSM,
        })?;
        let incoming = args.incoming.ok_or(CliError::MissingArgument {
            field: ARG_INCOMING,
            env: ENV_INCOMING,
        })?;

        let mut conflation = ConflationConfig::default();
        if let Some(value) = args.merge_threshold {
            conflation = conflation.with_merge_threshold(value);
        }
        if let Some(value) = args.ambiguity_margin {
            conflation = conflation.with_ambiguity_margin(value);
        }
        if let Some(value) = args.max_match_radius {
            conflation = conflation.with_max_match_radius(value);
        }
        if let Some(value) = args.geometry_weight {
            conflation = conflation.with_geometry_weight(value);
        }
        for entry in &args.tag_weight {
            let (key, weight) = parse_tag_weight(entry)?;
            conflation = conflation.with_tag_weight(key, weight);
        }
        conflation.validate()?;

        let load = LoadOptions {
            id_property: args.id_property,
            ..LoadOptions::default()
        };
        Ok(Self {
            osm,
            incoming,
            output_dir: args.output_dir.unwrap_or_else(|| Utf8PathBuf::from(".")),
            conflation,
            load,
        })
    }
}

pub(crate) fn parse_tag_weight(entry: &str) -> Result<(String, f64), CliError> {
    let invalid = || CliError::InvalidTagWeight {
        value: entry.to_owned(),
    };
    let (key, weight) = entry.split_once('=').ok_or_else(invalid)?;
    let trimmed_key = key.trim();
    if trimmed_key.is_empty() {
        return Err(invalid());
    }
    let parsed = weight.trim().parse::<f64>().map_err(|_| invalid())?;
    Ok((trimmed_key.to_owned(), parsed))
}

/// What one `conflate` run produced, printed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConflateReport {
    pub(crate) summary: RunSummary,
    pub(crate) skipped_osm: usize,
    pub(crate) skipped_incoming: usize,
    pub(crate) change_ops: usize,
    pub(crate) changes_path: Utf8PathBuf,
    pub(crate) review_path: Utf8PathBuf,
}

pub(crate) fn run_conflate(args: ConflateArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_conflate_with(args, &mut stdout)
}

pub(crate) fn run_conflate_with(args: ConflateArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    let report = execute_conflate(&config)?;
    write_report(writer, &report)
}

pub(crate) fn execute_conflate(config: &ConflateConfig) -> Result<ConflateReport, CliError> {
    let snapshot = load_osm_geojson(&config.osm)?;
    let dataset = load_incoming_geojson(&config.incoming, &config.load)?;

    let mut session = ConflationSession::new(config.conflation.clone())?;
    session.load_osm(snapshot.features)?;
    let summary = session.run(dataset.features)?;

    let changes = session.preview_changes()?;
    let pending = session.review_queue().pending();
    let changes_path = config.output_dir.join(CHANGES_FILE);
    let review_path = config.output_dir.join(REVIEW_FILE);
    write_changes_geojson(&changes_path, &changes)?;
    write_review_geojson(&review_path, &pending)?;
    info!(
        "conflation finished: {} operations, {} items awaiting review",
        changes.ops.len(),
        pending.len()
    );

    Ok(ConflateReport {
        summary,
        skipped_osm: snapshot.skipped.len(),
        skipped_incoming: dataset.skipped.len(),
        change_ops: changes.ops.len(),
        changes_path,
        review_path,
    })
}

fn write_report(writer: &mut dyn Write, report: &ConflateReport) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(report).map_err(CliError::SerialiseReport)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ConflateConfig, CliError> {
    let merged = ConflateArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ConflateConfig::try_from(merged)
}
