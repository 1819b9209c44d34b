//! Wind-tunnel TXT parser.
//!
//! Wind rigs export a preamble, then a header block starting at the line
//! holding the literal `%Dyn` marker, then the data section. Header tokens
//! accumulate (comma-split, `%` stripped) until the first line containing a
//! number; from there every line holding at least one number becomes a row.
//! Rows align to the header arity: longer rows truncate, shorter rows pad
//! with null.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoreError, CoreResult};
use crate::frame::{Column, Frame};
use crate::mat::MatFileIndex;

use super::{CHUNK_ROWS, FormatParser, FrameSink, ParserContext};

const HEADER_MARKER: &str = "%Dyn";

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Optional sign, optional decimal point, optional scientific exponent.
    Regex::new(r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").expect("static regex")
});

/// Wind-tunnel TXT format parser.
#[derive(Debug, Default)]
pub struct WindTxtParser;

impl FormatParser for WindTxtParser {
    fn stream(
        &self,
        source: &Path,
        _ctx: &ParserContext<'_>,
        sink: &mut dyn FrameSink,
    ) -> CoreResult<Option<MatFileIndex>> {
        let file = File::open(source)?;
        let reader = BufReader::new(file);

        let mut header: Vec<String> = Vec::new();
        let mut in_header = false;
        let mut rows: Vec<Vec<Option<f64>>> = Vec::new();
        let mut wrote_any = false;

        for line in reader.lines() {
            let line = line?;

            if !in_header && header.is_empty() {
                if line.contains(HEADER_MARKER) {
                    in_header = true;
                    header.extend(header_tokens(&line));
                }
                continue;
            }

            let numbers = extract_numbers(&line);
            if in_header {
                if numbers.is_empty() {
                    header.extend(header_tokens(&line));
                    continue;
                }
                // First numeric line ends the header block and is data.
                in_header = false;
            }

            if numbers.is_empty() {
                continue;
            }

            rows.push(align_row(numbers, header.len()));
            if rows.len() >= CHUNK_ROWS {
                flush(&mut rows, &header, sink)?;
                wrote_any = true;
            }
        }

        if header.is_empty() {
            return Err(CoreError::EmptySelection(format!(
                "no '{HEADER_MARKER}' header marker found"
            )));
        }
        if rows.is_empty() && !wrote_any {
            return Err(CoreError::EmptySelection(
                "no numeric rows after the header block".to_string(),
            ));
        }
        flush(&mut rows, &header, sink)?;

        Ok(None)
    }
}

/// Comma-split a header line, strip `%` and whitespace, drop empties.
fn header_tokens(line: &str) -> Vec<String> {
    line.split(',')
        .map(|t| t.replace('%', "").trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn extract_numbers(line: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(line)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

fn align_row(numbers: Vec<f64>, width: usize) -> Vec<Option<f64>> {
    let mut row: Vec<Option<f64>> = numbers.into_iter().map(Some).collect();
    row.truncate(width);
    row.resize(width, None);
    row
}

fn flush(
    rows: &mut Vec<Vec<Option<f64>>>,
    header: &[String],
    sink: &mut dyn FrameSink,
) -> CoreResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut columns = vec![Vec::with_capacity(rows.len()); header.len()];
    for row in rows.iter() {
        for (i, slot) in columns.iter_mut().enumerate() {
            slot.push(row.get(i).copied().flatten());
        }
    }
    let frame = Frame::new(
        header.to_vec(),
        columns.into_iter().map(Column::Float64).collect(),
    );
    rows.clear();
    sink.write_frame(&frame)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{WindTxtParser, extract_numbers, header_tokens};
    use crate::ingestion::{CollectSink, FormatParser, ParserContext};

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn rows_align_to_header_arity() {
        let file = write_temp("rig log v2\nignore me\n%Dyn,foo,bar\n1 2\nx 3 4\n5 6\n");
        let mut sink = CollectSink::default();
        WindTxtParser
            .stream(file.path(), &ParserContext::default(), &mut sink)
            .unwrap();

        let frame = &sink.frames[0];
        assert_eq!(frame.names(), ["Dyn", "foo", "bar"]);
        assert_eq!(
            frame.numeric_by_name("Dyn", "test").unwrap(),
            vec![Some(1.0), Some(3.0), Some(5.0)]
        );
        assert_eq!(
            frame.numeric_by_name("bar", "test").unwrap(),
            vec![None, None, None]
        );
    }

    #[test]
    fn header_accumulates_across_lines_until_numbers() {
        let file = write_temp("%Dyn,foo\n%bar,baz\n1 2 3 4\n");
        let mut sink = CollectSink::default();
        WindTxtParser
            .stream(file.path(), &ParserContext::default(), &mut sink)
            .unwrap();

        let frame = &sink.frames[0];
        assert_eq!(frame.names(), ["Dyn", "foo", "bar", "baz"]);
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn non_numeric_lines_in_data_section_are_skipped() {
        let file = write_temp("%Dyn,a\n1 2\n-- comment --\n3 4\n");
        let mut sink = CollectSink::default();
        WindTxtParser
            .stream(file.path(), &ParserContext::default(), &mut sink)
            .unwrap();
        assert_eq!(sink.frames[0].len(), 2);
    }

    #[test]
    fn missing_marker_is_an_empty_selection() {
        let file = write_temp("just\nsome\nlines\n");
        let mut sink = CollectSink::default();
        let err = WindTxtParser
            .stream(file.path(), &ParserContext::default(), &mut sink)
            .unwrap_err();
        assert!(err.to_string().contains("%Dyn"));
    }

    #[test]
    fn number_extraction_handles_signs_and_exponents() {
        assert_eq!(extract_numbers("x -1.5 2e3 .25"), vec![-1.5, 2000.0, 0.25]);
        assert!(extract_numbers("no digits here").is_empty());
    }

    #[test]
    fn header_tokens_strip_percent_and_whitespace() {
        assert_eq!(header_tokens("%Dyn, foo , %bar"), ["Dyn", "foo", "bar"]);
    }
}
