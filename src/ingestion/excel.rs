//! Excel worksheet parser: single-shot parse of one selected sheet.

use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};

use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;
use crate::mat::MatFileIndex;
use crate::types::HeaderMode;

use super::{FormatParser, FrameSink, ParserContext, resolve_headers};

/// Excel parser.
///
/// The selected sheet (by name, default first) is parsed in one shot. Columns
/// are pruned before header resolution: a column is dropped when its header
/// cell is blank or `unnamed*` and its data is entirely empty, and also when
/// the column is empty end to end.
#[derive(Debug, Default)]
pub struct ExcelParser;

impl FormatParser for ExcelParser {
    fn stream(
        &self,
        source: &Path,
        ctx: &ParserContext<'_>,
        sink: &mut dyn FrameSink,
    ) -> CoreResult<Option<MatFileIndex>> {
        let mut workbook = open_workbook_auto(source)?;

        let sheet = match ctx.sheet_name {
            Some(name) => name.to_string(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| CoreError::EmptySelection("workbook has no sheets".to_string()))?,
        };
        let range = workbook.worksheet_range(&sheet)?;

        let frame = sheet_to_frame(&range, ctx)?;
        sink.write_frame(&frame)?;
        Ok(None)
    }
}

fn sheet_to_frame(range: &Range<Data>, ctx: &ParserContext<'_>) -> CoreResult<Frame> {
    let grid: Vec<&[Data]> = range.rows().collect();
    let width = range.width();

    let header_consumed = ctx.header_mode == HeaderMode::File;
    let (header_row, data_rows) = if header_consumed && !grid.is_empty() {
        (Some(grid[0]), &grid[1..])
    } else {
        (None, &grid[..])
    };

    // Column pruning happens on the raw grid, before header resolution.
    let mut kept: Vec<usize> = Vec::with_capacity(width);
    for col in 0..width {
        let header_text = header_row
            .and_then(|row| row.get(col))
            .map(cell_to_header)
            .unwrap_or_default();
        let header_blank =
            header_text.trim().is_empty() || header_text.trim().to_lowercase().starts_with("unnamed");
        let data_blank = data_rows
            .iter()
            .all(|row| row.get(col).is_none_or(cell_is_blank));

        if data_blank && header_blank {
            continue;
        }
        kept.push(col);
    }

    if kept.is_empty() {
        return Err(CoreError::EmptySelection(
            "worksheet has no non-empty columns".to_string(),
        ));
    }

    let detected = header_row.map(|row| {
        kept.iter()
            .map(|&col| {
                let text = row.get(col).map(cell_to_header).unwrap_or_default();
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    format!("column_{}", col + 1)
                } else {
                    trimmed.to_string()
                }
            })
            .collect::<Vec<_>>()
    });

    let names = resolve_headers(ctx.header_mode, ctx.custom_headers, detected, kept.len())?;

    let rows: Vec<Vec<Option<String>>> = data_rows
        .iter()
        .map(|row| {
            kept.iter()
                .map(|&col| row.get(col).and_then(cell_to_text))
                .collect()
        })
        .collect();

    Ok(Frame::from_text_rows(names, &rows))
}

fn cell_is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_to_header(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        other => other.to_string(),
    }
}

fn cell_to_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(s.clone())
            }
        }
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => Some(dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(_) => None,
    }
}
