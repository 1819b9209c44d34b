//! CSV parser: chunk-scanned with a fixed row budget.

use std::path::Path;

use csv::ReaderBuilder;

use crate::error::CoreResult;
use crate::frame::{ColumnKind, Frame};
use crate::mat::MatFileIndex;
use crate::types::HeaderMode;

use super::{CHUNK_ROWS, FormatParser, FrameSink, ParserContext, resolve_headers};

/// CSV format parser.
///
/// Header modes: `file` consumes the first row as headers; `none` and
/// `custom` treat every row as data (custom names must match the arity of
/// the first record). The output schema is derived from the first chunk and
/// locked for the rest of the scan.
#[derive(Debug, Default)]
pub struct CsvParser;

impl FormatParser for CsvParser {
    fn stream(
        &self,
        source: &Path,
        ctx: &ParserContext<'_>,
        sink: &mut dyn FrameSink,
    ) -> CoreResult<Option<MatFileIndex>> {
        let has_headers = ctx.header_mode == HeaderMode::File;
        let mut reader = ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .from_path(source)?;

        let detected = if has_headers {
            Some(
                reader
                    .headers()?
                    .iter()
                    .map(|h| h.trim().to_string())
                    .collect::<Vec<_>>(),
            )
        } else {
            None
        };

        let mut names: Option<Vec<String>> = None;
        let mut kinds: Option<Vec<ColumnKind>> = None;
        let mut rows: Vec<Vec<Option<String>>> = Vec::new();

        for record in reader.records() {
            let record = record?;
            if names.is_none() {
                let width = detected
                    .as_ref()
                    .map(|d| d.len())
                    .unwrap_or_else(|| record.len());
                names = Some(resolve_headers(
                    ctx.header_mode,
                    ctx.custom_headers,
                    detected.clone(),
                    width,
                )?);
            }

            let width = names.as_ref().map(|n| n.len()).unwrap_or(0);
            rows.push(cells_of(&record, width));

            if rows.len() >= CHUNK_ROWS {
                flush(&mut rows, names.as_ref().expect("set above"), &mut kinds, sink)?;
            }
        }

        // A header-only file still has a schema; resolve it from the header.
        if names.is_none() {
            if let Some(detected) = detected {
                let width = detected.len();
                names = Some(resolve_headers(
                    ctx.header_mode,
                    ctx.custom_headers,
                    Some(detected),
                    width,
                )?);
            }
        }

        if let Some(names) = names.as_ref() {
            flush(&mut rows, names, &mut kinds, sink)?;
            if kinds.is_none() {
                // No data rows at all: emit the empty schema once.
                sink.write_frame(&Frame::from_text_rows(names.clone(), &[]))?;
            }
        }

        Ok(None)
    }
}

fn cells_of(record: &csv::StringRecord, width: usize) -> Vec<Option<String>> {
    (0..width)
        .map(|i| {
            record.get(i).and_then(|raw| {
                if raw.trim().is_empty() {
                    None
                } else {
                    Some(raw.to_string())
                }
            })
        })
        .collect()
}

fn flush(
    rows: &mut Vec<Vec<Option<String>>>,
    names: &[String],
    kinds: &mut Option<Vec<ColumnKind>>,
    sink: &mut dyn FrameSink,
) -> CoreResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let frame = match kinds.as_ref() {
        None => {
            let frame = Frame::from_text_rows(names.to_vec(), rows);
            *kinds = Some(frame.kinds());
            frame
        }
        Some(kinds) => Frame::from_text_rows_with_kinds(names.to_vec(), rows, kinds),
    };
    rows.clear();
    sink.write_frame(&frame)
}
