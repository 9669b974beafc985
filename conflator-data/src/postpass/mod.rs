//! SQL for PostPass extractions over the osm2pgsql flex schema.
//!
//! Queries always select `osm_id`, `tags` and a `geom` column, filter by a
//! WGS84 bounding box and optionally by a single tag key. The SQL carries no
//! trailing semicolon; PostPass rejects multiple statements.

mod bbox;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use bbox::{BoundingBox, BoundingBoxError};

/// Errors raised while assembling a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The table name is not one of the PostPass views.
    #[error("unknown PostPass table {name:?}")]
    UnknownTable {
        /// Name as supplied.
        name: String,
    },
    /// A tag filter was requested without a key.
    #[error("tag filter key must not be blank")]
    EmptyTagKey,
}

/// Tables and combined views exposed by PostPass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PostpassTable {
    /// Nodes.
    #[default]
    Point,
    /// Open ways.
    Line,
    /// Closed ways and multipolygon relations.
    Polygon,
    /// Points and lines.
    PointLine,
    /// Points and polygons.
    PointPolygon,
    /// Lines and polygons.
    LinePolygon,
    /// Every geometry type.
    PointLinePolygon,
}

impl PostpassTable {
    /// All tables in display order.
    pub const ALL: [Self; 7] = [
        Self::Point,
        Self::Line,
        Self::Polygon,
        Self::PointLine,
        Self::PointPolygon,
        Self::LinePolygon,
        Self::PointLinePolygon,
    ];

    /// SQL name of the table or view.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "postpass_point",
            Self::Line => "postpass_line",
            Self::Polygon => "postpass_polygon",
            Self::PointLine => "postpass_pointline",
            Self::PointPolygon => "postpass_pointpolygon",
            Self::LinePolygon => "postpass_linepolygon",
            Self::PointLinePolygon => "postpass_pointlinepolygon",
        }
    }
}

impl fmt::Display for PostpassTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostpassTable {
    type Err = QueryError;

    /// Accepts the SQL name with or without the `postpass_` prefix.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let trimmed = name.trim();
        let short = trimmed.strip_prefix("postpass_").unwrap_or(trimmed);
        Self::ALL
            .into_iter()
            .find(|table| table.as_str().strip_prefix("postpass_") == Some(short))
            .ok_or_else(|| QueryError::UnknownTable {
                name: name.to_owned(),
            })
    }
}

/// A filter over one key of the `tags` jsonb column.
///
/// No values, or the single value `*`, filters on key presence. Blank values
/// are dropped and everything is trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    key: String,
    values: Vec<String>,
}

impl TagFilter {
    /// Build a filter for `key` matching any of `values`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyTagKey`] when `key` is blank.
    pub fn new<I, S>(key: &str, values: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let trimmed_key = key.trim();
        if trimmed_key.is_empty() {
            return Err(QueryError::EmptyTagKey);
        }
        let mut cleaned: Vec<String> = values
            .into_iter()
            .map(|value| value.as_ref().trim().to_owned())
            .filter(|value| !value.is_empty())
            .collect();
        if cleaned.len() == 1 && cleaned.first().is_some_and(|value| value == "*") {
            cleaned.clear();
        }
        Ok(Self {
            key: trimmed_key.to_owned(),
            values: cleaned,
        })
    }

    /// Filter on key presence only.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyTagKey`] when `key` is blank.
    pub fn presence(key: &str) -> Result<Self, QueryError> {
        Self::new(key, std::iter::empty::<&str>())
    }

    /// Trimmed key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Accepted values; empty for a presence filter.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Render the `WHERE` clause fragment.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let key = quote_literal(&self.key);
        match self.values.as_slice() {
            [] => format!("tags ? {key}"),
            [value] => format!("tags->>{key} = {}", quote_literal(value)),
            values => {
                let list = values
                    .iter()
                    .map(|value| quote_literal(value))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("tags->>{key} IN ({list})")
            }
        }
    }
}

/// A bounding-box extraction against one PostPass table.
///
/// # Examples
///
/// ```
/// use conflator_data::{BoundingBox, PostpassQuery, PostpassTable, TagFilter};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bbox: BoundingBox = "13.3,52.4,13.5,52.6".parse()?;
/// let sql = PostpassQuery::new(PostpassTable::Point, bbox)
///     .with_tag_filter(TagFilter::new("amenity", ["cafe"])?)
///     .to_sql();
/// assert!(sql.ends_with("AND tags->>'amenity' = 'cafe'"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PostpassQuery {
    table: PostpassTable,
    bbox: BoundingBox,
    columns: Vec<String>,
    tag_filter: Option<TagFilter>,
    use_centroid: bool,
}

impl PostpassQuery {
    /// Select every feature of `table` inside `bbox`.
    #[must_use]
    pub const fn new(table: PostpassTable, bbox: BoundingBox) -> Self {
        Self {
            table,
            bbox,
            columns: Vec::new(),
            tag_filter: None,
            use_centroid: false,
        }
    }

    /// Buildings tagged `building=yes` from the point/polygon view.
    #[must_use]
    pub fn buildings(bbox: BoundingBox) -> Self {
        Self::new(PostpassTable::PointPolygon, bbox).with_tag_filter(TagFilter {
            key: "building".to_owned(),
            values: vec!["yes".to_owned()],
        })
    }

    /// Project extra tag keys as named columns. `*` and blank names are
    /// ignored.
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.columns.extend(
            columns
                .into_iter()
                .map(|column| column.as_ref().trim().to_owned())
                .filter(|column| !column.is_empty() && column != "*"),
        );
        self
    }

    /// Restrict results by tag.
    #[must_use]
    pub fn with_tag_filter(mut self, filter: TagFilter) -> Self {
        self.tag_filter = Some(filter);
        self
    }

    /// Return centroids instead of full geometries.
    #[must_use]
    pub const fn with_centroid(mut self, use_centroid: bool) -> Self {
        self.use_centroid = use_centroid;
        self
    }

    /// Table the query reads from.
    #[must_use]
    pub const fn table(&self) -> PostpassTable {
        self.table
    }

    /// Tag filter, if any.
    #[must_use]
    pub const fn tag_filter(&self) -> Option<&TagFilter> {
        self.tag_filter.as_ref()
    }

    /// Human-readable name for the extracted layer, such as
    /// `postpass_point amenity=cafe`.
    #[must_use]
    pub fn layer_name(&self) -> String {
        match &self.tag_filter {
            None => self.table.as_str().to_owned(),
            Some(filter) => match filter.values.as_slice() {
                [] => format!("{} {}", self.table, filter.key),
                values => format!("{} {}={}", self.table, filter.key, values.join("|")),
            },
        }
    }

    /// Render the full statement.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let mut select = vec!["osm_id".to_owned(), "tags".to_owned()];
        select.extend(self.columns.iter().map(|column| {
            format!(
                "tags->>{} as {}",
                quote_literal(column),
                quote_identifier(column)
            )
        }));
        select.push(if self.use_centroid {
            "ST_Centroid(geom) as geom".to_owned()
        } else {
            "geom".to_owned()
        });

        let mut clauses = vec![bbox_filter(&self.bbox)];
        clauses.extend(self.tag_filter.as_ref().map(TagFilter::to_sql));

        format!(
            "SELECT {} FROM {} WHERE {}",
            select.join(", "),
            self.table,
            clauses.join(" AND ")
        )
    }
}

fn bbox_filter(bbox: &BoundingBox) -> String {
    format!(
        "geom && ST_SetSRID(ST_MakeBox2D(ST_MakePoint({}, {}),ST_MakePoint({}, {})), 4326)",
        bbox.min_lon(),
        bbox.min_lat(),
        bbox.max_lon(),
        bbox.max_lat()
    )
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn bbox() -> BoundingBox {
        BoundingBox::new(13.3, 52.4, 13.5, 52.6).expect("valid bbox")
    }

    const BBOX_SQL: &str = "geom && ST_SetSRID(ST_MakeBox2D(ST_MakePoint(13.3, 52.4),\
                            ST_MakePoint(13.5, 52.6)), 4326)";

    #[rstest]
    fn bare_query_selects_default_columns(bbox: BoundingBox) {
        let sql = PostpassQuery::new(PostpassTable::Line, bbox).to_sql();
        assert_eq!(
            sql,
            format!("SELECT osm_id, tags, geom FROM postpass_line WHERE {BBOX_SQL}")
        );
    }

    #[rstest]
    fn buildings_preset_filters_point_polygon_view(bbox: BoundingBox) {
        let query = PostpassQuery::buildings(bbox);
        assert_eq!(query.table(), PostpassTable::PointPolygon);
        assert_eq!(
            query.to_sql(),
            format!(
                "SELECT osm_id, tags, geom FROM postpass_pointpolygon WHERE {BBOX_SQL} \
                 AND tags->>'building' = 'yes'"
            )
        );
        assert_eq!(query.layer_name(), "postpass_pointpolygon building=yes");
    }

    #[rstest]
    fn columns_and_centroid_extend_the_projection(bbox: BoundingBox) {
        let sql = PostpassQuery::new(PostpassTable::Point, bbox)
            .with_columns(["name", " * ", "", " amenity "])
            .with_centroid(true)
            .to_sql();
        assert!(
            sql.starts_with(
                "SELECT osm_id, tags, tags->>'name' as \"name\", \
                 tags->>'amenity' as \"amenity\", ST_Centroid(geom) as geom FROM postpass_point"
            ),
            "unexpected projection: {sql}"
        );
    }

    #[rstest]
    #[case(&[], "tags ? 'shop'")]
    #[case(&["*"], "tags ? 'shop'")]
    #[case(&["", "  "], "tags ? 'shop'")]
    #[case(&[" bakery "], "tags->>'shop' = 'bakery'")]
    #[case(&["bakery", "", "butcher"], "tags->>'shop' IN ('bakery', 'butcher')")]
    #[case(&["*", "bakery"], "tags->>'shop' IN ('*', 'bakery')")]
    fn tag_filter_forms(#[case] values: &[&str], #[case] expected: &str) {
        let filter = TagFilter::new(" shop ", values.iter().copied()).expect("valid key");
        assert_eq!(filter.to_sql(), expected);
    }

    #[rstest]
    fn quotes_are_doubled() {
        let filter = TagFilter::new("name", ["O'Brien's"]).expect("valid key");
        assert_eq!(filter.to_sql(), "tags->>'name' = 'O''Brien''s'");
    }

    #[rstest]
    fn blank_tag_key_is_rejected() {
        assert_eq!(TagFilter::presence("  "), Err(QueryError::EmptyTagKey));
    }

    #[rstest]
    #[case("postpass_point", PostpassTable::Point)]
    #[case("pointlinepolygon", PostpassTable::PointLinePolygon)]
    #[case(" postpass_linepolygon ", PostpassTable::LinePolygon)]
    fn table_names_parse(#[case] name: &str, #[case] expected: PostpassTable) {
        assert_eq!(name.parse::<PostpassTable>(), Ok(expected));
    }

    #[rstest]
    fn unknown_table_is_rejected() {
        assert_eq!(
            "postpass_area".parse::<PostpassTable>(),
            Err(QueryError::UnknownTable {
                name: "postpass_area".to_owned()
            })
        );
    }

    #[rstest]
    fn layer_name_describes_presence_filters(bbox: BoundingBox) {
        let query = PostpassQuery::new(PostpassTable::Point, bbox)
            .with_tag_filter(TagFilter::presence("amenity").expect("valid key"));
        assert_eq!(query.layer_name(), "postpass_point amenity");
        assert_eq!(
            PostpassQuery::new(PostpassTable::Line, bbox).layer_name(),
            "postpass_line"
        );
    }
}
