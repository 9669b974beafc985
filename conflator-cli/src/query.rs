//! `query` command: print PostPass SQL for a bounding box.

use std::io::Write;

use clap::Parser;
use conflator_data::{BoundingBox, PostpassQuery, PostpassTable, TagFilter};

use crate::CliError;

/// CLI arguments for the `query` subcommand.
#[derive(Debug, Clone, Parser, Default)]
#[command(
    long_about = "Print the PostPass SQL that extracts OSM features inside a \
                 bounding box. Without --tag-key the buildings preset \
                 (building=yes from postpass_pointpolygon) is used.",
    about = "Print a PostPass extraction query"
)]
pub(crate) struct QueryArgs {
    /// Bounding box as min_lon,min_lat,max_lon,max_lat (WGS84).
    #[arg(long, value_name = "bbox", allow_hyphen_values = true)]
    pub(crate) bbox: String,
    /// PostPass table or view, with or without the postpass_ prefix.
    #[arg(long, value_name = "name", default_value = "postpass_point")]
    pub(crate) table: String,
    /// Tag key to filter on.
    #[arg(long = "tag-key", value_name = "key")]
    pub(crate) tag_key: Option<String>,
    /// Accepted tag values; repeatable. Omit for a presence filter.
    #[arg(long = "tag-value", value_name = "value")]
    pub(crate) tag_value: Vec<String>,
    /// Extra tag keys to project as columns; repeatable.
    #[arg(long = "column", value_name = "key")]
    pub(crate) column: Vec<String>,
    /// Return centroids instead of full geometries.
    #[arg(long)]
    pub(crate) centroid: bool,
}

pub(crate) fn build_query(args: &QueryArgs) -> Result<PostpassQuery, CliError> {
    let bbox: BoundingBox = args.bbox.parse()?;
    let query = match args.tag_key.as_deref().map(str::trim) {
        None | Some("") => PostpassQuery::buildings(bbox),
        Some(key) => {
            let table: PostpassTable = args.table.parse()?;
            PostpassQuery::new(table, bbox).with_tag_filter(TagFilter::new(key, &args.tag_value)?)
        }
    };
    Ok(query
        .with_columns(&args.column)
        .with_centroid(args.centroid))
}

pub(crate) fn run_query(args: &QueryArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_query_with(args, &mut stdout)
}

pub(crate) fn run_query_with(args: &QueryArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let sql = build_query(args)?.to_sql();
    writer
        .write_all(sql.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}
