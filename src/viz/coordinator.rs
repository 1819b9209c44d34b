//! Visualization coordinator: plan, materialize, render, persist.

use std::io::{self, Cursor};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{error, info};

use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::mat::read_mat_slice;
use crate::store::{JobStore, ObjectStore, keys};
use crate::types::{ChartFamily, JobKind, JobStatus, TileDescriptor, TileStats, VisualizationJob};

use super::figure::{SeriesFrame, build_figure, build_mat_figure, render_html};
use super::loader::{LoaderSeriesMeta, build_zoom_loader};
use super::planner::{self, VizPlan};
use super::sample::{MAX_POINTS_XY, MAX_POINTS_XYZ, sample_xy, sample_xyz};
use super::tiles::{LOD_LEVELS, materialize_tiles};

/// Executes visualization jobs against the configured stores.
pub struct VisualizationCoordinator {
    objects: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobStore>,
    progress: Arc<crate::store::ProgressChannel>,
    settings: Settings,
}

impl VisualizationCoordinator {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobStore>,
        progress: Arc<crate::store::ProgressChannel>,
        settings: Settings,
    ) -> Self {
        Self {
            objects,
            jobs,
            progress,
            settings,
        }
    }

    /// Run one visualization job to terminal status. Failures persist
    /// `failure, 100, message` and re-raise; tiles already written stay in
    /// place and are overwritten by key on rerun.
    pub fn run(&self, viz_id: &str) -> CoreResult<()> {
        let viz = self.jobs.visualization(viz_id)?;
        info!(viz_id, chart = %viz.chart_type, "visualization started");

        match self.execute(&viz) {
            Ok(()) => {
                info!(viz_id, "visualization finished");
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                error!(viz_id, %message, "visualization failed");
                let _ = self.jobs.update_visualization(viz_id, &mut |j| {
                    j.status = JobStatus::Failure;
                    j.progress = 100;
                    j.message = Some(message.clone());
                });
                self.progress
                    .publish(JobKind::Visualization, viz_id, JobStatus::Failure, 100, &message);
                Err(err)
            }
        }
    }

    fn execute(&self, viz: &VisualizationJob) -> CoreResult<()> {
        let viz_id = viz.id.as_str();
        self.set_progress(viz_id, 10, "Preparing visualization")?;

        let plan = planner::plan(&self.jobs, &self.settings, viz)?;
        self.objects.ensure_bucket(&self.settings.visualization_bucket)?;

        match plan.mat.as_ref() {
            Some(_) => self.execute_mat(viz, &plan),
            None => self.execute_tabular(viz, &plan),
        }
    }

    fn execute_mat(&self, viz: &VisualizationJob, plan: &VizPlan) -> CoreResult<()> {
        let viz_id = viz.id.as_str();
        let mat = plan.mat.as_ref().expect("mat plan checked by caller");

        self.set_progress(viz_id, 25, "Reading MAT slice")?;
        let mut stream = self
            .objects
            .get_object(&self.settings.ingestion_bucket, &mat.job.raw_key)?;
        let mut spool = NamedTempFile::new()?;
        io::copy(&mut stream, spool.as_file_mut())?;
        drop(stream);

        let sliced = read_mat_slice(
            spool.path(),
            &mat.request.var,
            &mat.spec,
            mat.job.mat_meta.as_ref(),
        )?;

        self.set_progress(viz_id, 60, "Building MAT figure")?;
        let figure = build_mat_figure(plan.chart_type, &mat.request.var, &mat.spec.axis_dims, &sliced)?;
        let html = render_html(&figure, None);

        self.set_progress(viz_id, 85, "Saving visualization")?;
        let artifact_key = self.save_artifact(viz, &html)?;

        self.finalize(viz_id, artifact_key, Vec::new(), Vec::new())
    }

    fn execute_tabular(&self, viz: &VisualizationJob, plan: &VizPlan) -> CoreResult<()> {
        let viz_id = viz.id.as_str();

        let mut series_frames = Vec::with_capacity(plan.series.len());
        let mut tiles_meta: Vec<Vec<TileDescriptor>> = Vec::with_capacity(plan.series.len());
        let mut stats_meta: Vec<Option<TileStats>> = Vec::with_capacity(plan.series.len());
        let mut loader_meta = Vec::with_capacity(plan.series.len());

        for (idx0, series_plan) in plan.series.iter().enumerate() {
            let ordinal = idx0 + 1;
            let series = &series_plan.series;
            loader_meta.push(LoaderSeriesMeta {
                x_axis: series.x_axis.clone(),
                y_axis: series.y_axis.clone(),
                z_axis: series.z_axis.clone(),
                chart_type: series_plan.effective_type,
            });

            match series_plan.family {
                ChartFamily::Tiled => {
                    self.set_progress(viz_id, 30, &format!("Profiling series {ordinal}"))?;
                    let base_prefix = format!(
                        "projects/{}/visualizations/{}/series_{}",
                        viz.project_id, viz_id, ordinal
                    );
                    let (overview, tiles, stats) = materialize_tiles(
                        self.objects.as_ref(),
                        &series_plan.source,
                        &self.settings.visualization_bucket,
                        &base_prefix,
                        &series_plan.base_columns,
                        &series.derived_columns,
                        &series.x_axis,
                        &series.y_axis,
                        series.x_scale,
                        series.y_scale,
                        &LOD_LEVELS,
                    )?;

                    series_frames.push(SeriesFrame {
                        series: series.clone(),
                        effective_type: series_plan.effective_type,
                        frame: overview,
                    });
                    tiles_meta.push(tiles);
                    stats_meta.push(Some(stats));
                }
                ChartFamily::Raw => {
                    self.set_progress(viz_id, 30, &format!("Sampling points for series {ordinal}"))?;
                    let frame = if series_plan.effective_type.samples_xyz() {
                        let z_axis = series.z_axis.as_deref().ok_or_else(|| {
                            CoreError::InvalidJob(format!("series {ordinal} requires a z axis"))
                        })?;
                        sample_xyz(
                            self.objects.as_ref(),
                            &series_plan.source,
                            &series_plan.base_columns,
                            &series.derived_columns,
                            &series.x_axis,
                            &series.y_axis,
                            z_axis,
                            MAX_POINTS_XYZ,
                        )?
                    } else {
                        sample_xy(
                            self.objects.as_ref(),
                            &series_plan.source,
                            &series_plan.base_columns,
                            &series.derived_columns,
                            &series.x_axis,
                            &series.y_axis,
                            series.x_scale,
                            series.y_scale,
                            MAX_POINTS_XY,
                        )?
                    };
                    if frame.is_empty() {
                        return Err(CoreError::EmptySelection(format!(
                            "no usable numeric data for series {ordinal}"
                        )));
                    }
                    series_frames.push(SeriesFrame {
                        series: series.clone(),
                        effective_type: series_plan.effective_type,
                        frame,
                    });
                    tiles_meta.push(Vec::new());
                    stats_meta.push(None);
                }
            }
        }

        self.set_progress(viz_id, 60, "Building figure")?;
        let figure = build_figure(&series_frames)?;
        let loader = build_zoom_loader(
            viz_id,
            &LOD_LEVELS,
            &loader_meta,
            &stats_meta,
            &self.settings.api_base,
        );
        let html = render_html(&figure, loader.as_deref());

        self.set_progress(viz_id, 85, "Saving visualization")?;
        let artifact_key = self.save_artifact(viz, &html)?;

        self.finalize(viz_id, artifact_key, tiles_meta, stats_meta)
    }

    /// Delete a visualization: its chart artifact and tile prefix are
    /// removed best-effort before the document.
    pub fn delete(&self, viz_id: &str) -> CoreResult<()> {
        let viz = self.jobs.visualization(viz_id)?;
        if let Some(artifact_key) = viz.artifact_key.as_ref() {
            let _ = self
                .objects
                .remove_object(&self.settings.visualization_bucket, artifact_key);
        }
        self.objects.remove_prefix(
            &self.settings.visualization_bucket,
            &keys::tiles_prefix(&viz.project_id, viz_id),
        );
        self.jobs.delete_visualization(viz_id)?;
        Ok(())
    }

    fn save_artifact(&self, viz: &VisualizationJob, html: &str) -> CoreResult<String> {
        let key = keys::chart_key(&viz.project_id, &viz.id);
        let bytes = html.as_bytes().to_vec();
        let len = bytes.len() as u64;
        self.objects.put_object(
            &self.settings.visualization_bucket,
            &key,
            &mut Cursor::new(bytes),
            len,
            "text/html",
        )?;
        Ok(key)
    }

    fn finalize(
        &self,
        viz_id: &str,
        artifact_key: String,
        tiles: Vec<Vec<TileDescriptor>>,
        series_stats: Vec<Option<TileStats>>,
    ) -> CoreResult<()> {
        let message = "Visualization ready";
        self.jobs.update_visualization(viz_id, &mut |j| {
            j.status = JobStatus::Success;
            j.progress = 100;
            j.message = Some(message.to_string());
            j.artifact_key = Some(artifact_key.clone());
            j.tiles = tiles.clone();
            j.series_stats = series_stats.clone();
        })?;
        self.progress
            .publish(JobKind::Visualization, viz_id, JobStatus::Success, 100, message);
        Ok(())
    }

    fn set_progress(&self, viz_id: &str, progress: u8, message: &str) -> CoreResult<()> {
        self.progress
            .publish(JobKind::Visualization, viz_id, JobStatus::Started, progress, message);
        self.jobs.update_visualization(viz_id, &mut |j| {
            j.status = JobStatus::Started;
            j.progress = progress;
        })
    }
}
