//! Whitespace / delimiter-inferred TXT, DAT and C table parser.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::frame::{ColumnKind, Frame, parse_numeric};
use crate::mat::MatFileIndex;
use crate::types::HeaderMode;

use super::{CHUNK_ROWS, FormatParser, FrameSink, ParserContext, resolve_headers};

/// Delimiters probed, in priority order, before falling back to runs of
/// whitespace.
const CANDIDATE_DELIMITERS: [char; 4] = [',', '\t', ';', '|'];

/// Whitespace-table parser.
///
/// Accepts an optional 1-based inclusive `[start_line, end_line]` range.
/// The delimiter is inferred from the selected lines; if the first selected
/// line holds any non-numeric token it is treated as the header, otherwise
/// names are synthesized against the widest row. Short rows pad with null,
/// long rows truncate.
#[derive(Debug, Default)]
pub struct WhitespaceParser;

impl FormatParser for WhitespaceParser {
    fn stream(
        &self,
        source: &Path,
        ctx: &ParserContext<'_>,
        sink: &mut dyn FrameSink,
    ) -> CoreResult<Option<MatFileIndex>> {
        let file = File::open(source)?;
        let reader = BufReader::new(file);

        let mut selected: Vec<String> = Vec::new();
        for (idx0, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx0 + 1;
            if let Some(range) = ctx.parse_range {
                if line_no < range.start_line {
                    continue;
                }
                if line_no > range.end_line {
                    break;
                }
            }
            let cleaned = strip_leading_noise(&line);
            if !cleaned.is_empty() {
                selected.push(cleaned.to_string());
            }
        }

        if selected.is_empty() {
            return Err(CoreError::EmptySelection(match ctx.parse_range {
                Some(range) => format!(
                    "lines {}..={} contain no data",
                    range.start_line, range.end_line
                ),
                None => "file contains no data lines".to_string(),
            }));
        }

        let delimiter = infer_delimiter(&selected);
        let tokenized: Vec<Vec<String>> =
            selected.iter().map(|line| tokenize(line, delimiter)).collect();

        // Header sniff only applies in `file` mode; `none`/`custom` treat the
        // first selected line as data.
        let first_is_header = ctx.header_mode == HeaderMode::File
            && tokenized[0].iter().any(|t| parse_numeric(t).is_none());

        let (header_tokens, data) = if first_is_header {
            (Some(tokenized[0].clone()), &tokenized[1..])
        } else {
            (None, &tokenized[..])
        };

        let width = match &header_tokens {
            Some(tokens) => tokens.len(),
            None => data.iter().map(Vec::len).max().unwrap_or(0),
        };
        if width == 0 {
            return Err(CoreError::EmptySelection(
                "selected lines hold no columns".to_string(),
            ));
        }

        let names = resolve_headers(ctx.header_mode, ctx.custom_headers, header_tokens, width)?;

        let mut kinds: Option<Vec<ColumnKind>> = None;
        let mut rows: Vec<Vec<Option<String>>> = Vec::new();
        for tokens in data {
            rows.push(
                (0..width)
                    .map(|i| {
                        tokens.get(i).and_then(|t| {
                            if t.trim().is_empty() {
                                None
                            } else {
                                Some(t.clone())
                            }
                        })
                    })
                    .collect(),
            );
            if rows.len() >= CHUNK_ROWS {
                flush(&mut rows, &names, &mut kinds, sink)?;
            }
        }
        flush(&mut rows, &names, &mut kinds, sink)?;
        if kinds.is_none() {
            sink.write_frame(&Frame::from_text_rows(names, &[]))?;
        }

        Ok(None)
    }
}

/// Strip leading whitespace and punctuation, preserving characters a number
/// may begin with.
fn strip_leading_noise(line: &str) -> &str {
    line.trim_start_matches(|c: char| {
        c.is_whitespace()
            || (c.is_ascii_punctuation() && c != '-' && c != '+' && c != '.')
    })
    .trim_end()
}

/// Pick the candidate delimiter present on the most lines; ties resolve in
/// priority order. `None` means split on runs of whitespace.
fn infer_delimiter(lines: &[String]) -> Option<char> {
    let mut best: Option<(char, usize)> = None;
    for candidate in CANDIDATE_DELIMITERS {
        let hits = lines.iter().filter(|l| l.contains(candidate)).count();
        if hits == 0 {
            continue;
        }
        if best.is_none_or(|(_, best_hits)| hits > best_hits) {
            best = Some((candidate, hits));
        }
    }
    best.map(|(c, _)| c)
}

fn tokenize(line: &str, delimiter: Option<char>) -> Vec<String> {
    match delimiter {
        Some(delim) => line.split(delim).map(|t| t.trim().to_string()).collect(),
        None => line
            .split_whitespace()
            .map(|t| t.to_string())
            .collect(),
    }
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

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{WhitespaceParser, infer_delimiter, strip_leading_noise};
    use crate::ingestion::{CollectSink, FormatParser, ParserContext};
    use crate::types::{HeaderMode, ParseRange};

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn range_selects_one_based_inclusive_lines() {
        let file = write_temp("junk\nalpha beta\n1 2\n3 4\ntrailing\n");
        let mut sink = CollectSink::default();
        let ctx = ParserContext {
            parse_range: Some(ParseRange {
                start_line: 2,
                end_line: 4,
            }),
            ..Default::default()
        };
        WhitespaceParser.stream(file.path(), &ctx, &mut sink).unwrap();

        let frame = &sink.frames[0];
        assert_eq!(frame.names(), ["alpha", "beta"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(
            frame.numeric_by_name("alpha", "test").unwrap(),
            vec![Some(1.0), Some(3.0)]
        );
    }

    #[test]
    fn numeric_first_line_synthesizes_headers_to_widest_row() {
        let file = write_temp("1 2\n3 4 5\n");
        let mut sink = CollectSink::default();
        WhitespaceParser
            .stream(file.path(), &ParserContext::default(), &mut sink)
            .unwrap();

        let frame = &sink.frames[0];
        assert_eq!(frame.names(), ["column_1", "column_2", "column_3"]);
        assert_eq!(
            frame.numeric_by_name("column_3", "test").unwrap(),
            vec![None, Some(5.0)]
        );
    }

    #[test]
    fn comma_delimiter_is_inferred() {
        let file = write_temp("a,b\n1,2\n");
        let mut sink = CollectSink::default();
        WhitespaceParser
            .stream(file.path(), &ParserContext::default(), &mut sink)
            .unwrap();
        assert_eq!(sink.frames[0].names(), ["a", "b"]);
    }

    #[test]
    fn empty_range_fails_with_empty_selection() {
        let file = write_temp("1 2\n3 4\n");
        let mut sink = CollectSink::default();
        let ctx = ParserContext {
            parse_range: Some(ParseRange {
                start_line: 10,
                end_line: 12,
            }),
            ..Default::default()
        };
        let err = WhitespaceParser
            .stream(file.path(), &ctx, &mut sink)
            .unwrap_err();
        assert!(err.to_string().contains("empty selection"));
    }

    #[test]
    fn custom_headers_apply_to_widest_row() {
        let file = write_temp("1 2\n3 4\n");
        let mut sink = CollectSink::default();
        let headers = vec!["u".to_string(), "v".to_string()];
        let ctx = ParserContext {
            header_mode: HeaderMode::Custom,
            custom_headers: Some(&headers),
            ..Default::default()
        };
        WhitespaceParser.stream(file.path(), &ctx, &mut sink).unwrap();
        assert_eq!(sink.frames[0].names(), ["u", "v"]);
    }

    #[test]
    fn leading_noise_preserves_sign_characters() {
        assert_eq!(strip_leading_noise("## -1.5 2"), "-1.5 2");
        assert_eq!(strip_leading_noise("   % header"), "header");
        assert_eq!(strip_leading_noise("+3 4"), "+3 4");
    }

    #[test]
    fn delimiter_prefers_most_frequent_candidate() {
        let lines = vec!["a;b;c".to_string(), "1;2;3".to_string(), "x,y".to_string()];
        assert_eq!(infer_delimiter(&lines), Some(';'));
        let plain = vec!["1 2".to_string()];
        assert_eq!(infer_delimiter(&plain), None);
    }
}
