//! Visualization pipeline: planning, LOD tile materialization, raw-family
//! sampling, figure building and the deep-zoom query surface.

pub mod coordinator;
pub mod figure;
pub mod loader;
pub mod planner;
pub mod query;
pub mod sample;
pub mod tiles;

pub use coordinator::VisualizationCoordinator;
pub use loader::{ZoomMode, choose_mode};
pub use planner::{SeriesPlan, VizPlan, plan};
pub use query::{RawResponse, TilesResponse, ZoomQuery};
pub use tiles::LOD_LEVELS;

use crate::artifact::ArtifactReader;
use crate::derived;
use crate::error::CoreResult;
use crate::frame::Frame;
use crate::ingestion::{FrameSink, ParserContext, TableFormat, parser_for};
use crate::store::ObjectStore;
use crate::types::{DerivedSpec, HeaderMode, ParseRange};

use std::io;
use tempfile::NamedTempFile;

/// Where a series reads its rows from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// Canonical columnar artifact; supports projection and range pushdown.
    Parquet,
    /// Raw upload parsed on the fly with the job's parser settings.
    Text {
        format: TableFormat,
        header_mode: HeaderMode,
        custom_headers: Option<Vec<String>>,
        sheet_name: Option<String>,
        parse_range: Option<ParseRange>,
    },
}

/// A readable data source for one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSource {
    pub bucket: String,
    pub key: String,
    pub kind: SourceKind,
}

/// Stream a source chunk by chunk, applying column projection (parquet only)
/// and per-chunk derived-column materialization. The callback returns `false`
/// to stop early (e.g. a filled sampling budget).
pub fn stream_chunks<F>(
    objects: &dyn ObjectStore,
    source: &SeriesSource,
    read_columns: Option<&[String]>,
    derived_specs: &[DerivedSpec],
    mut on_chunk: F,
) -> CoreResult<()>
where
    F: FnMut(&Frame) -> CoreResult<bool>,
{
    match &source.kind {
        SourceKind::Parquet => {
            let stream = objects.get_object(&source.bucket, &source.key)?;
            let reader = ArtifactReader::from_stream(stream)?;
            let groups = reader.frames(read_columns)?;
            for frame in groups {
                let frame = if derived_specs.is_empty() {
                    frame
                } else {
                    derived::apply_to_frame(&frame, derived_specs)?
                };
                if !on_chunk(&frame)? {
                    break;
                }
            }
            Ok(())
        }
        SourceKind::Text {
            format,
            header_mode,
            custom_headers,
            sheet_name,
            parse_range,
        } => {
            // Text sources cannot project; spool and reparse with the job's
            // original header settings.
            let mut stream = objects.get_object(&source.bucket, &source.key)?;
            let mut spool = NamedTempFile::new()?;
            io::copy(&mut stream, spool.as_file_mut())?;
            drop(stream);

            let ctx = ParserContext {
                header_mode: *header_mode,
                custom_headers: custom_headers.as_deref(),
                sheet_name: sheet_name.as_deref(),
                parse_range: *parse_range,
                mat_config: None,
            };

            let mut sink = CallbackSink {
                derived_specs,
                on_chunk: &mut on_chunk,
                stopped: false,
            };
            parser_for(*format).stream(spool.path(), &ctx, &mut sink)?;
            Ok(())
        }
    }
}

struct CallbackSink<'a, F>
where
    F: FnMut(&Frame) -> CoreResult<bool>,
{
    derived_specs: &'a [DerivedSpec],
    on_chunk: &'a mut F,
    stopped: bool,
}

impl<F> FrameSink for CallbackSink<'_, F>
where
    F: FnMut(&Frame) -> CoreResult<bool>,
{
    fn write_frame(&mut self, frame: &Frame) -> CoreResult<()> {
        if self.stopped {
            return Ok(());
        }
        let extended;
        let frame = if self.derived_specs.is_empty() {
            frame
        } else {
            extended = derived::apply_to_frame(frame, self.derived_specs)?;
            &extended
        };
        if !(self.on_chunk)(frame)? {
            self.stopped = true;
        }
        Ok(())
    }
}
