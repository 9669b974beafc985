//! Error types emitted by the conflator CLI.
//!
//! Keep this error type reasonably small, as every CLI helper returns
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use conflator_core::{ChangeError, ConfigError, SessionError};
use conflator_data::{BoundingBoxError, GeoJsonLoadError, GeoJsonWriteError, QueryError};
use thiserror::Error;

/// Errors emitted by the conflator CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Flag name without dashes.
        field: &'static str,
        /// Environment variable that can supply it.
        env: &'static str,
    },
    /// A referenced input path does not exist.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        /// Flag naming the input.
        field: &'static str,
        /// Path as configured.
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        /// Flag naming the input.
        field: &'static str,
        /// Path as configured.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A `--tag-weight` value is not `key=weight`.
    #[error("tag weight {value:?} must look like key=weight")]
    InvalidTagWeight {
        /// Value as given.
        value: String,
    },
    /// The conflation parameters are out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Reading a GeoJSON input failed.
    #[error(transparent)]
    Load(#[from] GeoJsonLoadError),
    /// Writing a GeoJSON output failed.
    #[error(transparent)]
    Write(#[from] GeoJsonWriteError),
    /// The conflation session failed.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Automatic decisions could not be turned into changes.
    #[error(transparent)]
    Changes(#[from] ChangeError),
    /// The `--bbox` value is malformed.
    #[error("invalid --bbox: {0}")]
    BoundingBox(#[from] BoundingBoxError),
    /// The PostPass query options are invalid.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// The run report could not be serialised.
    #[error("failed to serialise run report: {0}")]
    SerialiseReport(#[source] serde_json::Error),
    /// Writing to stdout failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
