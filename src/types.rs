//! Job documents and chart model types.
//!
//! These are the records persisted in the document database (collections
//! `ingestion_jobs` and `visualizations`) and the value types shared by the
//! parsers, the tile materializer and the planner. Everything here is plain
//! data with `serde` derives; the pipelines own the behavior.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Terminal and intermediate job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting for a worker.
    Queued,
    /// A worker is executing the job; progress is in `[5, 99]`.
    Started,
    /// Terminal success.
    Success,
    /// Terminal failure; `message` carries the error text.
    Failure,
    /// Raw-only upload kept in object storage without parsing.
    Stored,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Stored => "stored",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure | JobStatus::Stored)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How column names are obtained for a tabular upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// First row of the file (or selected range) carries the headers.
    #[default]
    File,
    /// No header row; synthesize `column_1..column_N`.
    None,
    /// Caller supplies the names; arity must match the detected columns.
    Custom,
}

impl HeaderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HeaderMode::File => "file",
            HeaderMode::None => "none",
            HeaderMode::Custom => "custom",
        }
    }
}

/// Dataset family tag attached at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFamily {
    Cfd,
    Wind,
    Flight,
    #[default]
    Other,
}

impl DatasetFamily {
    /// Folder segment used in object keys.
    pub fn folder(self) -> &'static str {
        match self {
            DatasetFamily::Cfd => "CFD",
            DatasetFamily::Wind => "Wind_Data",
            DatasetFamily::Flight => "Flight_Data",
            DatasetFamily::Other => "Unknown",
        }
    }
}

/// 1-based inclusive line range for whitespace TXT/DAT/C parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseRange {
    pub start_line: usize,
    pub end_line: usize,
}

impl ParseRange {
    pub fn validate(&self) -> bool {
        self.start_line >= 1 && self.end_line >= self.start_line
    }
}

/// One derived-column definition: a new name plus an expression over `[refs]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedSpec {
    pub name: String,
    pub expression: String,
}

impl DerivedSpec {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// Per-column numeric profile recorded at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
}

/// Axis scale for a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AxisScale {
    #[default]
    Linear,
    Log,
}

impl AxisScale {
    pub fn is_log(self) -> bool {
        matches!(self, AxisScale::Log)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AxisScale::Linear => "linear",
            AxisScale::Log => "log",
        }
    }
}

/// Chart family: tiled charts get LOD tiles, raw charts get sampled points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartFamily {
    Tiled,
    Raw,
}

/// All chart types renderable by the figure builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Scatter,
    ScatterLine,
    Line,
    Bar,
    Polar,
    Histogram,
    Box,
    Violin,
    Heatmap,
    Contour,
    Scatter3d,
    Line3d,
    Surface,
}

impl ChartType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Scatter => "scatter",
            ChartType::ScatterLine => "scatterline",
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Polar => "polar",
            ChartType::Histogram => "histogram",
            ChartType::Box => "box",
            ChartType::Violin => "violin",
            ChartType::Heatmap => "heatmap",
            ChartType::Contour => "contour",
            ChartType::Scatter3d => "scatter3d",
            ChartType::Line3d => "line3d",
            ChartType::Surface => "surface",
        }
    }

    /// Tiled charts support LOD swapping; everything else needs raw points.
    pub fn family(self) -> ChartFamily {
        match self {
            ChartType::Scatter | ChartType::ScatterLine | ChartType::Line | ChartType::Bar => {
                ChartFamily::Tiled
            }
            _ => ChartFamily::Raw,
        }
    }

    /// Chart types that need a Z axis on every series.
    pub fn requires_z(self) -> bool {
        matches!(
            self,
            ChartType::Contour | ChartType::Scatter3d | ChartType::Line3d | ChartType::Surface
        )
    }

    /// Chart types sampled as XYZ triples rather than XY pairs.
    pub fn samples_xyz(self) -> bool {
        self.requires_z()
    }

    /// The subset allowed when per-series overrides mix chart types.
    pub fn is_cartesian_2d(self) -> bool {
        matches!(
            self,
            ChartType::Scatter | ChartType::ScatterLine | ChartType::Line | ChartType::Bar
        )
    }

    /// Chart types a MAT-sourced visualization may use.
    pub fn supports_mat(self) -> bool {
        matches!(
            self,
            ChartType::Line
                | ChartType::Scatter
                | ChartType::Heatmap
                | ChartType::Contour
                | ChartType::Surface
        )
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One curve/surface on a chart, bound to a single ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub job_id: String,
    pub x_axis: String,
    pub y_axis: String,
    #[serde(default)]
    pub z_axis: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub x_scale: AxisScale,
    #[serde(default)]
    pub y_scale: AxisScale,
    /// Optional per-series chart type override.
    #[serde(default)]
    pub chart_type: Option<ChartType>,
    /// Derived columns consumed only by this series.
    #[serde(default)]
    pub derived_columns: Vec<DerivedSpec>,
}

impl Series {
    /// Legend label: explicit label, else the Y column name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.y_axis)
    }
}

/// One axis of a MAT variable mapping: which dimension feeds the axis, and
/// optionally which coordinate vector labels it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub dim: usize,
    #[serde(default)]
    pub coord: Option<String>,
}

/// A user-supplied filter value for one MAT dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Integer filters are treated as direct indices.
    Index(i64),
    /// Numeric filters resolve by nearest coordinate value.
    Number(f64),
    /// Text is parsed as a number; digit-only text acts as an index.
    Text(String),
}

/// MAT slice request attached to a visualization job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatRequest {
    /// Ingestion job holding the `.mat` upload.
    pub job_id: String,
    /// Variable name (dotted paths address nested struct fields).
    pub var: String,
    /// Axis key (`x`/`y`/`z`) to dimension mapping.
    pub mapping: BTreeMap<String, AxisMapping>,
    /// Per-dimension filter values for the non-free dimensions.
    #[serde(default)]
    pub filters: BTreeMap<String, FilterValue>,
}

/// Where a visualization draws its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Tabular,
    Mat,
}

/// Descriptor of one materialized LOD tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    /// Bin count of the level.
    pub level: usize,
    /// Object key of the tile parquet.
    pub object_key: String,
    /// Non-empty bins emitted into the tile.
    pub rows: u64,
    pub x_min: f64,
    pub x_max: f64,
}

/// Axis-bounds statistics recorded per tiled series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileStats {
    pub x_min: f64,
    pub x_max: f64,
    /// Rows seen while scanning the X axis.
    pub rows: u64,
    /// Chunks that contributed data during accumulation.
    pub partitions: u64,
}

/// Progress event mirrored into the status key and published per transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
}

/// Which pipeline a job/progress key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Ingestion,
    Visualization,
}

impl JobKind {
    /// Key prefix used by the status hash and the event channel.
    pub fn prefix(self) -> &'static str {
        match self {
            JobKind::Ingestion => "ingestion",
            JobKind::Visualization => "visualization",
        }
    }
}

/// Persisted ingestion job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: String,
    pub project_id: String,
    pub owner_email: String,
    pub filename: String,
    /// Object key of the raw upload; never mutated after creation.
    pub raw_key: String,
    /// Object key of the canonical columnar artifact; set on tabular success.
    #[serde(default)]
    pub processed_key: Option<String>,
    #[serde(default)]
    pub dataset_family: DatasetFamily,
    pub tag_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub header_mode: HeaderMode,
    #[serde(default)]
    pub custom_headers: Option<Vec<String>>,
    #[serde(default)]
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub parse_range: Option<ParseRange>,
    /// Optional MAT table extraction config for `.mat` uploads.
    #[serde(default)]
    pub mat_config: Option<MatRequest>,
    /// Derived columns materialized into the processed artifact.
    #[serde(default)]
    pub derived_columns: Vec<DerivedSpec>,
    /// False for storage-only uploads; they finalize as `stored`.
    #[serde(default)]
    pub visualize_enabled: bool,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    /// Canonical column list, recorded on success.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub rows_seen: Option<u64>,
    /// First rows of the parsed table, as JSON objects keyed by column.
    #[serde(default)]
    pub sample_rows: Option<Vec<serde_json::Value>>,
    /// Per-column numeric min/max profile.
    #[serde(default)]
    pub stats: Option<BTreeMap<String, ColumnStats>>,
    /// MAT variable index, recorded for `.mat` uploads.
    #[serde(default)]
    pub mat_meta: Option<crate::mat::MatFileIndex>,
}

/// Persisted visualization job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationJob {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub source_type: SourceType,
    pub chart_type: ChartType,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub mat_request: Option<MatRequest>,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    /// Object key of the rendered chart artifact.
    #[serde(default)]
    pub artifact_key: Option<String>,
    /// Tile descriptors per series (empty vectors for raw-family series).
    #[serde(default)]
    pub tiles: Vec<Vec<TileDescriptor>>,
    /// Axis stats per series (`None` for raw-family series).
    #[serde(default)]
    pub series_stats: Vec<Option<TileStats>>,
    pub created_at: u64,
    pub updated_at: u64,
}
