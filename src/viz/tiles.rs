//! LOD tile materialization.
//!
//! Two passes over the series source: one to find the X bounds, one to fill
//! per-level binned accumulators. Each level is written as a parquet tile
//! keyed `…/series_{i}/level_{L}.parquet`; the coarsest level doubles as the
//! overview embedded into the initial chart artifact.

use std::io::Cursor;

use crate::artifact::frame_to_parquet_bytes;
use crate::error::{CoreError, CoreResult};
use crate::frame::{Column, Frame};
use crate::store::ObjectStore;
use crate::types::{AxisScale, DerivedSpec, TileDescriptor, TileStats};

use super::{SeriesSource, stream_chunks};
use crate::derived::build_formula_plan;

/// Default bin counts, coarsest first.
pub const LOD_LEVELS: [usize; 3] = [256, 1024, 4096];

/// Widening applied when the scanned X range collapses to a point.
const DEGENERATE_RANGE_EPS: f64 = 1e-9;

/// Per-level binned aggregates: one value per bin per stat, in four parallel
/// arrays.
#[derive(Debug, Clone)]
pub struct LevelAccumulator {
    bins: usize,
    edges: Vec<f64>,
    counts: Vec<i64>,
    sums: Vec<f64>,
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl LevelAccumulator {
    pub fn new(bins: usize, x_min: f64, x_max: f64, scale: AxisScale) -> CoreResult<Self> {
        let edges = match scale {
            AxisScale::Linear => linspace(x_min, x_max, bins + 1),
            AxisScale::Log => {
                if x_min <= 0.0 || x_max <= 0.0 {
                    return Err(CoreError::LogScaleInvalid {
                        column: "x".to_string(),
                        observed_min: x_min.min(x_max),
                    });
                }
                logspace(x_min.log10(), x_max.log10(), bins + 1)
            }
        };
        Ok(Self {
            bins,
            edges,
            counts: vec![0; bins],
            sums: vec![0.0; bins],
            mins: vec![f64::INFINITY; bins],
            maxs: vec![f64::NEG_INFINITY; bins],
        })
    }

    /// Bin edges; reproducible from `(bins, x_min, x_max, scale)`.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Digitize one value. Interior edges are left-inclusive for the upper
    /// bin; a value equal to the top edge lands in the last bin.
    pub fn bin_index(&self, x: f64) -> Option<usize> {
        if !x.is_finite() || x < self.edges[0] || x > self.edges[self.bins] {
            return None;
        }
        let idx = self.edges.partition_point(|e| *e <= x).saturating_sub(1);
        Some(idx.min(self.bins - 1))
    }

    /// Aggregate paired samples; callers pre-filter NaN and log-invalid rows.
    pub fn ingest(&mut self, xs: &[f64], ys: &[f64]) {
        for (x, y) in xs.iter().zip(ys.iter()) {
            let Some(bin) = self.bin_index(*x) else {
                continue;
            };
            self.counts[bin] += 1;
            self.sums[bin] += y;
            self.mins[bin] = self.mins[bin].min(*y);
            self.maxs[bin] = self.maxs[bin].max(*y);
        }
    }

    /// Emit the tile table `{x_center, count, <y_axis>=mean, y_min, y_max}`,
    /// skipping empty bins. The mean column carries the Y-axis name so the
    /// zoom loader can swap trace data without a rename.
    pub fn to_frame(&self, x_axis: &str, y_axis: &str) -> Frame {
        let mut centers = Vec::new();
        let mut counts = Vec::new();
        let mut means = Vec::new();
        let mut mins = Vec::new();
        let mut maxs = Vec::new();

        for bin in 0..self.bins {
            if self.counts[bin] == 0 {
                continue;
            }
            centers.push(Some((self.edges[bin] + self.edges[bin + 1]) / 2.0));
            counts.push(Some(self.counts[bin] as f64));
            means.push(Some(self.sums[bin] / self.counts[bin] as f64));
            mins.push(Some(self.mins[bin]));
            maxs.push(Some(self.maxs[bin]));
        }

        Frame::new(
            vec![
                x_axis.to_string(),
                "count".to_string(),
                y_axis.to_string(),
                "y_min".to_string(),
                "y_max".to_string(),
            ],
            vec![
                Column::Float64(centers),
                Column::Float64(counts),
                Column::Float64(means),
                Column::Float64(mins),
                Column::Float64(maxs),
            ],
        )
    }

    /// Total samples aggregated across bins.
    pub fn total_count(&self) -> i64 {
        self.counts.iter().sum()
    }
}

fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    let step = (end - start) / (points - 1) as f64;
    (0..points).map(|i| start + step * i as f64).collect()
}

fn logspace(start_exp: f64, end_exp: f64, points: usize) -> Vec<f64> {
    linspace(start_exp, end_exp, points)
        .into_iter()
        .map(|e| 10f64.powf(e))
        .collect()
}

/// Scan the source reading only X (plus derived dependencies), returning
/// `(x_min, x_max, rows)`. Fails `LogScaleInvalid` the moment a log-scaled
/// axis observes a value <= 0.
pub fn scan_axis_bounds(
    objects: &dyn ObjectStore,
    source: &SeriesSource,
    base_columns: &[String],
    derived_specs: &[DerivedSpec],
    x_axis: &str,
    x_scale: AxisScale,
) -> CoreResult<(f64, f64, u64)> {
    let plan = build_formula_plan(base_columns, derived_specs, &[x_axis])?;
    let projection = projection_for(source, &plan.read_columns);

    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut rows = 0u64;

    stream_chunks(
        objects,
        source,
        projection.as_deref(),
        &plan.derived,
        |frame| {
            let xs = frame.numeric_by_name(x_axis, "axis bounds scan")?;
            for x in xs.into_iter().flatten() {
                if x.is_nan() {
                    continue;
                }
                x_min = x_min.min(x);
                x_max = x_max.max(x);
                rows += 1;
            }
            if x_scale.is_log() && x_min <= 0.0 {
                return Err(CoreError::LogScaleInvalid {
                    column: x_axis.to_string(),
                    observed_min: x_min,
                });
            }
            Ok(true)
        },
    )?;

    if !x_min.is_finite() || !x_max.is_finite() {
        return Err(CoreError::EmptySelection(format!(
            "unable to detect range for x-axis '{x_axis}'"
        )));
    }
    Ok((x_min, x_max, rows))
}

/// Materialize all levels for one series: returns the overview frame
/// (coarsest level), tile descriptors and the stats block.
#[allow(clippy::too_many_arguments)]
pub fn materialize_tiles(
    objects: &dyn ObjectStore,
    source: &SeriesSource,
    tile_bucket: &str,
    base_prefix: &str,
    base_columns: &[String],
    derived_specs: &[DerivedSpec],
    x_axis: &str,
    y_axis: &str,
    x_scale: AxisScale,
    y_scale: AxisScale,
    levels: &[usize],
) -> CoreResult<(Frame, Vec<TileDescriptor>, TileStats)> {
    let (x_min, mut x_max, rows) =
        scan_axis_bounds(objects, source, base_columns, derived_specs, x_axis, x_scale)?;
    if x_min == x_max {
        x_max += DEGENERATE_RANGE_EPS;
    }

    let mut accumulators: Vec<(usize, LevelAccumulator)> = levels
        .iter()
        .map(|&bins| LevelAccumulator::new(bins, x_min, x_max, x_scale).map(|acc| (bins, acc)))
        .collect::<CoreResult<_>>()?;

    let plan = build_formula_plan(base_columns, derived_specs, &[x_axis, y_axis])?;
    let projection = projection_for(source, &plan.read_columns);

    let mut partitions = 0u64;
    stream_chunks(
        objects,
        source,
        projection.as_deref(),
        &plan.derived,
        |frame| {
            let xs = frame.numeric_by_name(x_axis, "tile accumulation")?;
            let ys = frame.numeric_by_name(y_axis, "tile accumulation")?;

            let mut x_keep = Vec::with_capacity(xs.len());
            let mut y_keep = Vec::with_capacity(ys.len());
            for (x, y) in xs.into_iter().zip(ys.into_iter()) {
                let (Some(x), Some(y)) = (x, y) else { continue };
                if x.is_nan() || y.is_nan() {
                    continue;
                }
                if x_scale.is_log() && x <= 0.0 {
                    continue;
                }
                if y_scale.is_log() && y <= 0.0 {
                    continue;
                }
                x_keep.push(x);
                y_keep.push(y);
            }
            if x_keep.is_empty() {
                return Ok(true);
            }

            partitions += 1;
            for (_, acc) in accumulators.iter_mut() {
                acc.ingest(&x_keep, &y_keep);
            }
            Ok(true)
        },
    )?;

    let mut tiles = Vec::with_capacity(levels.len());
    for (bins, acc) in &accumulators {
        let frame = acc.to_frame(x_axis, y_axis);
        let bytes = frame_to_parquet_bytes(&frame)?;
        let object_key = format!("{base_prefix}/level_{bins}.parquet");
        let len = bytes.len() as u64;
        objects.put_object(
            tile_bucket,
            &object_key,
            &mut Cursor::new(bytes),
            len,
            "application/octet-stream",
        )?;
        tiles.push(TileDescriptor {
            level: *bins,
            object_key,
            rows: frame.len() as u64,
            x_min,
            x_max,
        });
    }

    let overview_bins = levels.iter().copied().min().unwrap_or(LOD_LEVELS[0]);
    let overview = accumulators
        .iter()
        .find(|(bins, _)| *bins == overview_bins)
        .map(|(_, acc)| acc.to_frame(x_axis, y_axis))
        .unwrap_or_default();

    let stats = TileStats {
        x_min,
        x_max,
        rows,
        partitions,
    };
    Ok((overview, tiles, stats))
}

/// Parquet sources project to the planned read columns; text sources reparse
/// everything.
fn projection_for(source: &SeriesSource, read_columns: &[String]) -> Option<Vec<String>> {
    match source.kind {
        super::SourceKind::Parquet if !read_columns.is_empty() => Some(read_columns.to_vec()),
        _ => None,
    }
}
