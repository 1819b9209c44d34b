//! Chunk profiling: running column stats, sample capture, row counting.

use std::collections::BTreeMap;

use crate::derived;
use crate::error::CoreResult;
use crate::frame::Frame;
use crate::mat::MatFileIndex;
use crate::types::{ColumnStats, DerivedSpec};

use super::FrameSink;

/// Result of parsing one upload: the canonical column list, totals, the
/// first-N sample rows, per-column numeric min/max and optional MAT metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub columns: Vec<String>,
    pub rows_seen: u64,
    pub sample_rows: Vec<serde_json::Value>,
    pub stats: BTreeMap<String, ColumnStats>,
    pub mat_meta: Option<MatFileIndex>,
}

/// Running profile over streamed frames.
///
/// Numeric stats coerce each column and ignore NaN; min/max merge across
/// chunks. The column list is locked by the first frame.
#[derive(Debug)]
pub struct StatsProfiler {
    sample_budget: usize,
    columns: Vec<String>,
    mins: Vec<f64>,
    maxs: Vec<f64>,
    seen: Vec<bool>,
    rows: u64,
    samples: Vec<serde_json::Value>,
}

impl StatsProfiler {
    pub fn new(sample_budget: usize) -> Self {
        Self {
            sample_budget,
            columns: Vec::new(),
            mins: Vec::new(),
            maxs: Vec::new(),
            seen: Vec::new(),
            rows: 0,
            samples: Vec::new(),
        }
    }

    pub fn observe(&mut self, frame: &Frame) {
        if self.columns.is_empty() {
            self.columns = frame.names().to_vec();
            self.mins = vec![f64::INFINITY; frame.width()];
            self.maxs = vec![f64::NEG_INFINITY; frame.width()];
            self.seen = vec![false; frame.width()];
        }

        if self.samples.len() < self.sample_budget {
            self.samples
                .extend(frame.sample_rows(self.sample_budget - self.samples.len()));
        }

        self.rows += frame.len() as u64;

        for (idx, column) in self.columns.iter().enumerate() {
            let Some(col) = frame.column_by_name(column) else {
                continue;
            };
            for value in col.numeric().into_iter().flatten() {
                if value.is_nan() {
                    continue;
                }
                self.mins[idx] = self.mins[idx].min(value);
                self.maxs[idx] = self.maxs[idx].max(value);
                self.seen[idx] = true;
            }
        }
    }

    pub fn finish(self) -> ParseOutcome {
        let mut stats = BTreeMap::new();
        for (idx, column) in self.columns.iter().enumerate() {
            if self.seen[idx] {
                stats.insert(
                    column.clone(),
                    ColumnStats {
                        min: self.mins[idx],
                        max: self.maxs[idx],
                    },
                );
            }
        }
        ParseOutcome {
            columns: self.columns,
            rows_seen: self.rows,
            sample_rows: self.samples,
            stats,
            mat_meta: None,
        }
    }
}

/// Sink chain used by the coordinator: derived columns are materialized onto
/// each chunk, the profiler observes the extended frame, and the extended
/// frame flows on to the inner sink (usually the artifact writer).
pub struct PipelineSink<'a> {
    derived: &'a [DerivedSpec],
    profiler: &'a mut StatsProfiler,
    inner: &'a mut dyn FrameSink,
}

impl<'a> PipelineSink<'a> {
    pub fn new(
        derived: &'a [DerivedSpec],
        profiler: &'a mut StatsProfiler,
        inner: &'a mut dyn FrameSink,
    ) -> Self {
        Self {
            derived,
            profiler,
            inner,
        }
    }
}

impl FrameSink for PipelineSink<'_> {
    fn write_frame(&mut self, frame: &Frame) -> CoreResult<()> {
        if self.derived.is_empty() {
            self.profiler.observe(frame);
            return self.inner.write_frame(frame);
        }
        let extended = derived::apply_to_frame(frame, self.derived)?;
        self.profiler.observe(&extended);
        self.inner.write_frame(&extended)
    }
}

#[cfg(test)]
mod tests {
    use super::StatsProfiler;
    use crate::frame::{Column, Frame};

    #[test]
    fn stats_merge_across_chunks_and_ignore_nan() {
        let mut profiler = StatsProfiler::new(10);
        profiler.observe(&Frame::new(
            vec!["a".into()],
            vec![Column::Float64(vec![Some(3.0), Some(f64::NAN), None])],
        ));
        profiler.observe(&Frame::new(
            vec!["a".into()],
            vec![Column::Float64(vec![Some(-1.0), Some(7.0)])],
        ));

        let outcome = profiler.finish();
        assert_eq!(outcome.rows_seen, 5);
        let stats = &outcome.stats["a"];
        assert_eq!(stats.min, -1.0);
        assert_eq!(stats.max, 7.0);
    }

    #[test]
    fn sample_budget_spans_chunks() {
        let mut profiler = StatsProfiler::new(3);
        profiler.observe(&Frame::new(
            vec!["a".into()],
            vec![Column::Float64(vec![Some(1.0), Some(2.0)])],
        ));
        profiler.observe(&Frame::new(
            vec!["a".into()],
            vec![Column::Float64(vec![Some(3.0), Some(4.0)])],
        ));

        let outcome = profiler.finish();
        assert_eq!(outcome.sample_rows.len(), 3);
        assert_eq!(outcome.sample_rows[2]["a"], serde_json::json!(3.0));
    }

    #[test]
    fn all_null_columns_get_no_stats_entry() {
        let mut profiler = StatsProfiler::new(10);
        profiler.observe(&Frame::new(
            vec!["a".into(), "b".into()],
            vec![
                Column::Float64(vec![Some(1.0)]),
                Column::Utf8(vec![Some("text".into())]),
            ],
        ));
        let outcome = profiler.finish();
        assert!(outcome.stats.contains_key("a"));
        assert!(!outcome.stats.contains_key("b"));
    }
}
