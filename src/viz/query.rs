//! Deep-zoom query surface: tile frames and raw windowed points.
//!
//! These are the read paths the embedded loader calls back into at runtime.
//! Missing visualizations, series or tiles come back as `NotFound` results
//! for the caller to translate; nothing here runs on a worker.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample as index_sample;
use serde::Serialize;
use serde_json::{Map, Number, Value as Json};

use crate::artifact::ArtifactReader;
use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::store::{JobStore, ObjectStore};
use crate::types::TileDescriptor;

use super::sample::SAMPLE_SEED;

/// Default point budget for raw windowed reads.
pub const RAW_MAX_POINTS: usize = 200_000;
/// Hard cap a caller may raise `max_points` to.
pub const RAW_POINT_CAP: usize = 2_000_000;

/// Response of a tile read.
#[derive(Debug, Clone, Serialize)]
pub struct TilesResponse {
    pub series: usize,
    pub level: usize,
    pub tile: TileDescriptor,
    pub rows: usize,
    pub data: Vec<Json>,
}

/// Response of a raw windowed read.
#[derive(Debug, Clone, Serialize)]
pub struct RawResponse {
    pub series: usize,
    pub rows: usize,
    pub x_axis: String,
    pub y_axis: String,
    pub data: Vec<Json>,
}

/// Read-side service over the stores.
pub struct ZoomQuery {
    objects: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobStore>,
    settings: Settings,
}

impl ZoomQuery {
    pub fn new(objects: Arc<dyn ObjectStore>, jobs: Arc<dyn JobStore>, settings: Settings) -> Self {
        Self {
            objects,
            jobs,
            settings,
        }
    }

    /// Read one tile frame, optionally windowed by `[x_min, x_max]`.
    ///
    /// With no `level`, the smallest (coarsest) materialized level is used.
    pub fn tiles(
        &self,
        viz_id: &str,
        series_index: usize,
        level: Option<usize>,
        x_min: Option<f64>,
        x_max: Option<f64>,
    ) -> CoreResult<TilesResponse> {
        let viz = self.jobs.visualization(viz_id)?;
        let series = viz
            .series
            .get(series_index)
            .ok_or_else(|| CoreError::NotFound(format!("series {series_index} of {viz_id}")))?;
        let tiles = viz
            .tiles
            .get(series_index)
            .filter(|tiles| !tiles.is_empty())
            .ok_or_else(|| {
                CoreError::NotFound(format!("no tiles for series {series_index} of {viz_id}"))
            })?;

        let descriptor = match level {
            Some(wanted) => tiles
                .iter()
                .find(|t| t.level == wanted)
                .ok_or_else(|| CoreError::NotFound(format!("tile level {wanted} of {viz_id}")))?,
            None => tiles
                .iter()
                .min_by_key(|t| t.level)
                .expect("tiles checked non-empty"),
        };

        let stream = self
            .objects
            .get_object(&self.settings.visualization_bucket, &descriptor.object_key)?;
        let reader = ArtifactReader::from_stream(stream)?;
        let mut frame = reader.read_all(None)?;

        // Older tiles carry the mean under `y_mean`; alias it to the Y axis.
        if frame.index_of(&series.y_axis).is_none() {
            frame.rename_column("y_mean", &series.y_axis);
        }

        let frame = if x_min.is_some() || x_max.is_some() {
            window_frame(&frame, &series.x_axis, x_min, x_max)?
        } else {
            frame
        };

        Ok(TilesResponse {
            series: series_index,
            level: descriptor.level,
            tile: descriptor.clone(),
            rows: frame.len(),
            data: frame.rows_json(),
        })
    }

    /// Read raw windowed XY points from the series' processed artifact.
    pub fn raw(
        &self,
        viz_id: &str,
        series_index: usize,
        x_min: Option<f64>,
        x_max: Option<f64>,
        max_points: Option<usize>,
    ) -> CoreResult<RawResponse> {
        let viz = self.jobs.visualization(viz_id)?;
        let series = viz
            .series
            .get(series_index)
            .ok_or_else(|| CoreError::NotFound(format!("series {series_index} of {viz_id}")))?;
        let job = self.jobs.ingestion(&series.job_id)?;

        let processed_key = job.processed_key.as_ref().ok_or_else(|| {
            CoreError::RawNotAvailable(format!(
                "dataset '{}' has no processed columnar artifact",
                job.filename
            ))
        })?;

        let max_points = max_points.unwrap_or(RAW_MAX_POINTS).min(RAW_POINT_CAP).max(1);

        let stream = self
            .objects
            .get_object(&self.settings.ingestion_bucket, processed_key)?;
        let reader = ArtifactReader::from_stream(stream)?;
        let projection = vec![series.x_axis.clone(), series.y_axis.clone()];
        let frame = reader.read_window(&projection, &series.x_axis, x_min, x_max)?;

        let xs = frame.numeric_by_name(&series.x_axis, "raw window")?;
        let ys = frame.numeric_by_name(&series.y_axis, "raw window")?;

        let mut points: Vec<(f64, f64)> = xs
            .into_iter()
            .zip(ys)
            .filter_map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) if !x.is_nan() && !y.is_nan() => Some((x, y)),
                _ => None,
            })
            .collect();

        if points.len() > max_points {
            let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
            let mut picks: Vec<usize> = index_sample(&mut rng, points.len(), max_points)
                .into_iter()
                .collect();
            picks.sort_unstable();
            points = picks.into_iter().map(|i| points[i]).collect();
        }

        points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let data = points
            .iter()
            .map(|(x, y)| {
                let mut obj = Map::with_capacity(2);
                obj.insert(series.x_axis.clone(), number_json(*x));
                obj.insert(series.y_axis.clone(), number_json(*y));
                Json::Object(obj)
            })
            .collect::<Vec<_>>();

        Ok(RawResponse {
            series: series_index,
            rows: data.len(),
            x_axis: series.x_axis.clone(),
            y_axis: series.y_axis.clone(),
            data,
        })
    }
}

fn number_json(x: f64) -> Json {
    Number::from_f64(x).map(Json::Number).unwrap_or(Json::Null)
}

fn window_frame(
    frame: &crate::frame::Frame,
    x_axis: &str,
    x_min: Option<f64>,
    x_max: Option<f64>,
) -> CoreResult<crate::frame::Frame> {
    use crate::frame::Column;

    let xs = frame.numeric_by_name(x_axis, "tile window")?;
    let keep: Vec<bool> = xs
        .iter()
        .map(|v| match v {
            Some(x) => x_min.is_none_or(|lo| *x >= lo) && x_max.is_none_or(|hi| *x <= hi),
            None => false,
        })
        .collect();

    let columns = (0..frame.width())
        .map(|idx| match frame.column(idx).expect("index in range") {
            Column::Float64(v) => Column::Float64(
                v.iter()
                    .zip(keep.iter())
                    .filter_map(|(cell, k)| k.then_some(*cell))
                    .collect(),
            ),
            Column::Utf8(v) => Column::Utf8(
                v.iter()
                    .zip(keep.iter())
                    .filter_map(|(cell, k)| k.then(|| cell.clone()))
                    .collect(),
            ),
        })
        .collect();

    Ok(crate::frame::Frame::new(frame.names().to_vec(), columns))
}
