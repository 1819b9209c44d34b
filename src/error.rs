use thiserror::Error;

/// Convenience result type used across the crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Error type shared by the ingestion and visualization pipelines.
///
/// This is a single error enum: format parsers, the derived-column engine,
/// tile materialization, MAT slicing and the stores all surface through it so
/// the coordinators can persist one human-readable message per failed job.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Excel workbook error.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Parquet read/write error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// The supplied header strategy does not match the file.
    #[error("invalid header spec (mode '{mode}'): {detail}")]
    InvalidHeaderSpec { mode: String, detail: String },

    /// A parse range / sheet / filter selection matched no data.
    #[error("empty selection: {0}")]
    EmptySelection(String),

    /// The file extension or chart type is not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Object storage could not be reached or refused the operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Failed reading an object or artifact.
    #[error("read error: {0}")]
    ReadError(String),

    /// Failed writing an object or artifact.
    #[error("write error: {0}")]
    WriteError(String),

    /// A log-scaled axis contains values <= 0.
    #[error("log scale selected for '{column}' but observed minimum is {observed_min}")]
    LogScaleInvalid { column: String, observed_min: f64 },

    /// Per-series chart overrides left the 2D Cartesian family.
    #[error("mixed-series charts support only scatter/line/bar/scatterline; got '{chart_type}' for series '{label}'")]
    IncompatibleMixedSeries { chart_type: String, label: String },

    /// A referenced column does not exist.
    #[error("column '{column}' not found ({context})")]
    ColumnNotFound { column: String, context: String },

    /// A derived column references another derived column defined later.
    #[error("derived column '{name}' references '[{reference}]' before it is defined")]
    ForwardReference { name: String, reference: String },

    /// Duplicate derived-column name.
    #[error("duplicate derived column name: {0}")]
    DuplicateName(String),

    /// Derived expression exceeds the length cap.
    #[error("expression for '{name}' is too long ({len} chars, max {max})")]
    ExpressionTooLong { name: String, len: usize, max: usize },

    /// Derived expression calls a function outside the closed table.
    #[error("unknown function '{0}' in derived expression")]
    UnknownFunction(String),

    /// Derived expression failed to parse.
    #[error("invalid expression for '{name}' at position {position}: {detail}")]
    Expression {
        name: String,
        position: usize,
        detail: String,
    },

    /// A derived-column spec is half-filled or a job document is inconsistent.
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// The requested MAT slice exceeds the element cap.
    #[error("requested MAT slice has {cells} elements (max {max_cells})")]
    SliceTooLarge { cells: usize, max_cells: usize },

    /// Malformed MAT container.
    #[error("mat format error: {0}")]
    MatFormat(String),

    /// Raw windowed reads need a processed columnar artifact.
    #[error("raw points are not available: {0}")]
    RawNotAvailable(String),

    /// Requested object / job / tile does not exist.
    ///
    /// The zoom query surface returns this to its caller as a typed result;
    /// it is never raised inside a worker.
    #[error("not found: {0}")]
    NotFound(String),
}

impl CoreError {
    /// True for errors an upstream handler should translate into a 5xx.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            CoreError::Io(_)
                | CoreError::StorageUnavailable(_)
                | CoreError::ReadError(_)
                | CoreError::WriteError(_)
        )
    }
}
