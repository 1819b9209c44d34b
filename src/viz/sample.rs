//! Deterministic sampling for raw chart families.
//!
//! Streams chunks, keeps numeric rows, and downsamples any chunk that would
//! overflow the remaining budget by uniform sampling without replacement with
//! a fixed seed, so identical inputs always produce identical output.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample as index_sample;

use crate::derived::build_formula_plan;
use crate::error::CoreResult;
use crate::frame::{Column, Frame};
use crate::store::ObjectStore;
use crate::types::{AxisScale, DerivedSpec};

use super::{SeriesSource, SourceKind, stream_chunks};

/// XY point budget.
pub const MAX_POINTS_XY: usize = 120_000;
/// XYZ point budget.
pub const MAX_POINTS_XYZ: usize = 200_000;
/// Fixed sampling seed.
pub const SAMPLE_SEED: u64 = 42;

/// Sample up to `max_points` numeric XY rows from a source.
#[allow(clippy::too_many_arguments)]
pub fn sample_xy(
    objects: &dyn ObjectStore,
    source: &SeriesSource,
    base_columns: &[String],
    derived_specs: &[DerivedSpec],
    x_axis: &str,
    y_axis: &str,
    x_scale: AxisScale,
    y_scale: AxisScale,
    max_points: usize,
) -> CoreResult<Frame> {
    sample_columns(
        objects,
        source,
        base_columns,
        derived_specs,
        &[x_axis, y_axis],
        &[x_scale, y_scale],
        max_points,
    )
}

/// Sample up to `max_points` numeric XYZ rows from a source.
#[allow(clippy::too_many_arguments)]
pub fn sample_xyz(
    objects: &dyn ObjectStore,
    source: &SeriesSource,
    base_columns: &[String],
    derived_specs: &[DerivedSpec],
    x_axis: &str,
    y_axis: &str,
    z_axis: &str,
    max_points: usize,
) -> CoreResult<Frame> {
    sample_columns(
        objects,
        source,
        base_columns,
        derived_specs,
        &[x_axis, y_axis, z_axis],
        &[AxisScale::Linear, AxisScale::Linear, AxisScale::Linear],
        max_points,
    )
}

fn sample_columns(
    objects: &dyn ObjectStore,
    source: &SeriesSource,
    base_columns: &[String],
    derived_specs: &[DerivedSpec],
    columns: &[&str],
    scales: &[AxisScale],
    max_points: usize,
) -> CoreResult<Frame> {
    let plan = build_formula_plan(base_columns, derived_specs, columns)?;
    let projection = match source.kind {
        SourceKind::Parquet if !plan.read_columns.is_empty() => Some(plan.read_columns.clone()),
        _ => None,
    };

    let mut kept: Vec<Vec<Option<f64>>> = vec![Vec::new(); columns.len()];
    let mut kept_n = 0usize;

    stream_chunks(
        objects,
        source,
        projection.as_deref(),
        &plan.derived,
        |frame| {
            let mut series: Vec<Vec<Option<f64>>> = Vec::with_capacity(columns.len());
            for column in columns {
                series.push(frame.numeric_by_name(column, "sampling")?);
            }

            // Row-level grouping: a row survives only when every requested
            // column is numeric and passes its scale filter.
            let rows = frame.len();
            let mut surviving: Vec<usize> = Vec::with_capacity(rows);
            'rows: for row in 0..rows {
                for (values, scale) in series.iter().zip(scales.iter()) {
                    match values[row] {
                        Some(v) if !v.is_nan() => {
                            if scale.is_log() && v <= 0.0 {
                                continue 'rows;
                            }
                        }
                        _ => continue 'rows,
                    }
                }
                surviving.push(row);
            }
            if surviving.is_empty() {
                return Ok(true);
            }

            let remaining = max_points.saturating_sub(kept_n);
            if remaining == 0 {
                return Ok(false);
            }

            let selected: Vec<usize> = if surviving.len() > remaining {
                let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
                let mut picks: Vec<usize> = index_sample(&mut rng, surviving.len(), remaining)
                    .into_iter()
                    .collect();
                picks.sort_unstable();
                picks.into_iter().map(|i| surviving[i]).collect()
            } else {
                surviving
            };

            for (slot, values) in kept.iter_mut().zip(series.iter()) {
                slot.extend(selected.iter().map(|&row| values[row]));
            }
            kept_n += selected.len();

            Ok(kept_n < max_points)
        },
    )?;

    Ok(Frame::new(
        columns.iter().map(|c| c.to_string()).collect(),
        kept.into_iter().map(Column::Float64).collect(),
    ))
}

/// Downsample an in-memory frame to `max_points` rows with the fixed seed.
/// Used by the 3D figure paths, which cap points after sampling.
pub fn downsample_frame(frame: &Frame, max_points: usize) -> Frame {
    if frame.len() <= max_points {
        return frame.clone();
    }
    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
    let mut picks: Vec<usize> = index_sample(&mut rng, frame.len(), max_points)
        .into_iter()
        .collect();
    picks.sort_unstable();

    let columns = (0..frame.width())
        .map(|idx| match frame.column(idx).expect("index in range") {
            Column::Float64(v) => Column::Float64(picks.iter().map(|&i| v[i]).collect()),
            Column::Utf8(v) => Column::Utf8(picks.iter().map(|&i| v[i].clone()).collect()),
        })
        .collect();
    Frame::new(frame.names().to_vec(), columns)
}
