//! Ingestion: format dispatch and streaming parsers.
//!
//! Formats are a closed set registered explicitly in [`parser_for`]; each
//! parser implements [`FormatParser`] and streams [`Frame`] chunks into a
//! [`FrameSink`]. Profiling (column stats, sample rows, row counts) and
//! derived-column materialization are layered on the sink by the coordinator,
//! so parsers only know how to tokenize their format.

pub mod coordinator;
pub mod csv;
pub mod excel;
pub mod stats;
pub mod whitespace;
pub mod wind;

pub use coordinator::IngestionCoordinator;
pub use stats::{ParseOutcome, StatsProfiler};

use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;
use crate::mat::MatFileIndex;
use crate::types::{DatasetFamily, DerivedSpec, HeaderMode, MatRequest, ParseRange};

/// Row budget per parsed chunk for the streaming text formats.
pub const CHUNK_ROWS: usize = 200_000;

/// Sample rows captured onto the job document.
pub const SAMPLE_ROWS: usize = 10;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Comma-separated values.
    Csv,
    /// Excel worksheet (single selected sheet).
    Excel,
    /// Whitespace/delimiter-inferred TXT/DAT/C, optionally range-limited.
    Whitespace,
    /// Wind-tunnel TXT with a `%Dyn` header marker.
    WindTxt,
    /// MATLAB container.
    Mat,
}

impl TableFormat {
    /// Dispatch by file extension and dataset family. Wind-tagged `.txt`
    /// uploads use the wind-tunnel protocol; everything else is plain
    /// whitespace parsing.
    pub fn detect(extension: &str, family: DatasetFamily) -> Option<Self> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(TableFormat::Csv),
            "xlsx" | "xls" | "xlsm" => Some(TableFormat::Excel),
            "txt" if family == DatasetFamily::Wind => Some(TableFormat::WindTxt),
            "txt" | "dat" | "c" => Some(TableFormat::Whitespace),
            "mat" => Some(TableFormat::Mat),
            _ => None,
        }
    }

    /// Formats that materialize a processed columnar artifact.
    pub fn is_tabular(self) -> bool {
        !matches!(self, TableFormat::Mat)
    }
}

/// Lowercased extension of a filename, with the leading dot.
pub fn extension_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) => filename[idx..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Receives parsed chunks in order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> CoreResult<()>;
}

/// Sink that drops every frame; used when only profiling is wanted.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn write_frame(&mut self, _frame: &Frame) -> CoreResult<()> {
        Ok(())
    }
}

/// Sink that keeps every frame in memory; used by tests and small reads.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub frames: Vec<Frame>,
}

impl FrameSink for CollectSink {
    fn write_frame(&mut self, frame: &Frame) -> CoreResult<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// Per-job inputs a parser may consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserContext<'a> {
    pub header_mode: HeaderMode,
    pub custom_headers: Option<&'a [String]>,
    pub sheet_name: Option<&'a str>,
    pub parse_range: Option<ParseRange>,
    pub mat_config: Option<&'a MatRequest>,
}

/// Uniform parser interface: stream the source into `sink`, returning MAT
/// index metadata when the format carries any.
pub trait FormatParser: Send + Sync {
    fn stream(
        &self,
        source: &Path,
        ctx: &ParserContext<'_>,
        sink: &mut dyn FrameSink,
    ) -> CoreResult<Option<MatFileIndex>>;
}

/// Explicit format registry.
pub fn parser_for(format: TableFormat) -> &'static dyn FormatParser {
    match format {
        TableFormat::Csv => &csv::CsvParser,
        TableFormat::Excel => &excel::ExcelParser,
        TableFormat::Whitespace => &whitespace::WhitespaceParser,
        TableFormat::WindTxt => &wind::WindTxtParser,
        TableFormat::Mat => &crate::mat::MatParser,
    }
}

/// Parse a file and profile it in one pass: runs the format parser with a
/// profiling sink chained onto `inner`, applying `derived` columns per chunk.
pub fn parse_and_profile(
    format: TableFormat,
    source: &Path,
    ctx: &ParserContext<'_>,
    derived: &[DerivedSpec],
    inner: &mut dyn FrameSink,
) -> CoreResult<ParseOutcome> {
    let mut profiler = StatsProfiler::new(SAMPLE_ROWS);
    let mat_meta = {
        let mut sink = stats::PipelineSink::new(derived, &mut profiler, inner);
        parser_for(format).stream(source, ctx, &mut sink)?
    };
    let mut outcome = profiler.finish();
    outcome.mat_meta = mat_meta;
    Ok(outcome)
}

/// Resolve column names for a detected width under a header mode.
pub(crate) fn resolve_headers(
    mode: HeaderMode,
    custom: Option<&[String]>,
    detected: Option<Vec<String>>,
    width: usize,
) -> CoreResult<Vec<String>> {
    match mode {
        HeaderMode::File => Ok(detected.unwrap_or_else(|| synthesized(width))),
        HeaderMode::None => Ok(synthesized(width)),
        HeaderMode::Custom => {
            let provided = custom.ok_or_else(|| CoreError::InvalidHeaderSpec {
                mode: mode.as_str().to_string(),
                detail: "custom headers were not provided".to_string(),
            })?;
            if provided.len() != width {
                return Err(CoreError::InvalidHeaderSpec {
                    mode: mode.as_str().to_string(),
                    detail: format!(
                        "{} custom headers do not match {} detected columns",
                        provided.len(),
                        width
                    ),
                });
            }
            Ok(provided.to_vec())
        }
    }
}

fn synthesized(width: usize) -> Vec<String> {
    (1..=width).map(|i| format!("column_{i}")).collect()
}

#[cfg(test)]
mod tests {
    use super::{TableFormat, extension_of, resolve_headers};
    use crate::types::{DatasetFamily, HeaderMode};

    #[test]
    fn extension_dispatch_honors_wind_family() {
        assert_eq!(
            TableFormat::detect(".txt", DatasetFamily::Wind),
            Some(TableFormat::WindTxt)
        );
        assert_eq!(
            TableFormat::detect(".txt", DatasetFamily::Flight),
            Some(TableFormat::Whitespace)
        );
        assert_eq!(TableFormat::detect(".CSV", DatasetFamily::Other), Some(TableFormat::Csv));
        assert_eq!(TableFormat::detect(".pdf", DatasetFamily::Other), None);
    }

    #[test]
    fn custom_headers_must_match_arity() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let err = resolve_headers(HeaderMode::Custom, Some(&headers), None, 3).unwrap_err();
        assert!(err.to_string().contains("custom"));

        let ok = resolve_headers(HeaderMode::Custom, Some(&headers), None, 2).unwrap();
        assert_eq!(ok, headers);
    }

    #[test]
    fn none_mode_synthesizes_names() {
        let names = resolve_headers(HeaderMode::None, None, None, 3).unwrap();
        assert_eq!(names, ["column_1", "column_2", "column_3"]);
    }

    #[test]
    fn extension_of_lowercases() {
        assert_eq!(extension_of("Run01.DAT"), ".dat");
        assert_eq!(extension_of("noext"), "");
    }
}
