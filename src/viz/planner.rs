//! Visualization planning: series validation, chart-family classification
//! and data-source mapping. Everything here fails before any data is
//! scanned, so a bad request never reaches materialization.

use std::sync::Arc;

use crate::config::Settings;
use crate::derived::{self, FormulaPlan};
use crate::error::{CoreError, CoreResult};
use crate::ingestion::{TableFormat, extension_of};
use crate::mat::{MatSliceSpec, build_slice_spec};
use crate::store::JobStore;
use crate::types::{
    ChartFamily, ChartType, IngestionJob, JobStatus, MatRequest, Series, SourceType,
    VisualizationJob,
};

use super::{SeriesSource, SourceKind};

/// One validated series, ready for materialization.
#[derive(Debug, Clone)]
pub struct SeriesPlan {
    pub series: Series,
    pub job: IngestionJob,
    pub effective_type: ChartType,
    pub family: ChartFamily,
    pub source: SeriesSource,
    pub formula: FormulaPlan,
    /// Base columns of the referenced dataset.
    pub base_columns: Vec<String>,
}

/// Validated MAT route.
#[derive(Debug, Clone)]
pub struct MatPlan {
    pub request: MatRequest,
    pub job: IngestionJob,
    pub spec: MatSliceSpec,
}

/// Output of planning one visualization job.
#[derive(Debug, Clone)]
pub struct VizPlan {
    pub chart_type: ChartType,
    pub mixed: bool,
    pub series: Vec<SeriesPlan>,
    pub mat: Option<MatPlan>,
}

impl VizPlan {
    /// True when any series belongs to the tiled family.
    pub fn any_tiled(&self) -> bool {
        self.series.iter().any(|s| s.family == ChartFamily::Tiled)
    }
}

/// Plan a visualization job. Re-planning a successful job with unchanged
/// inputs yields the same classification and series order.
pub fn plan(
    jobs: &Arc<dyn JobStore>,
    settings: &Settings,
    viz: &VisualizationJob,
) -> CoreResult<VizPlan> {
    match viz.source_type {
        SourceType::Mat => plan_mat(jobs, viz),
        SourceType::Tabular => plan_tabular(jobs, settings, viz),
    }
}

fn plan_mat(jobs: &Arc<dyn JobStore>, viz: &VisualizationJob) -> CoreResult<VizPlan> {
    let request = viz
        .mat_request
        .clone()
        .ok_or_else(|| CoreError::InvalidJob("MAT visualization requires a mat_request".to_string()))?;
    if request.job_id.is_empty() || request.var.trim().is_empty() || request.mapping.is_empty() {
        return Err(CoreError::InvalidJob(
            "MAT request requires job_id, var and mapping".to_string(),
        ));
    }
    if !viz.chart_type.supports_mat() {
        return Err(CoreError::UnsupportedFormat(format!(
            "chart type '{}' is not supported for MAT sources",
            viz.chart_type
        )));
    }

    let job = jobs.ingestion(&request.job_id)?;
    if job.project_id != viz.project_id {
        return Err(CoreError::InvalidJob(
            "referenced MAT dataset belongs to another project".to_string(),
        ));
    }
    if job.status != JobStatus::Success {
        return Err(CoreError::InvalidJob(format!(
            "MAT dataset '{}' has not finished ingestion",
            job.filename
        )));
    }
    if extension_of(&job.filename) != ".mat" {
        return Err(CoreError::UnsupportedFormat(format!(
            "'{}' is not a MAT file",
            job.filename
        )));
    }

    let spec = build_slice_spec(
        viz.chart_type,
        &request.mapping,
        &request.filters,
        crate::mat::DEFAULT_MAX_CELLS,
    )?;

    Ok(VizPlan {
        chart_type: viz.chart_type,
        mixed: false,
        series: Vec::new(),
        mat: Some(MatPlan { request, job, spec }),
    })
}

fn plan_tabular(
    jobs: &Arc<dyn JobStore>,
    settings: &Settings,
    viz: &VisualizationJob,
) -> CoreResult<VizPlan> {
    if viz.series.is_empty() {
        return Err(CoreError::InvalidJob(
            "no series configured for visualization".to_string(),
        ));
    }

    // Mixed mode: any explicit per-series override restricts every effective
    // type to the 2D Cartesian subset.
    let mixed = viz.series.iter().any(|s| s.chart_type.is_some());

    let mut plans = Vec::with_capacity(viz.series.len());
    for (index, series) in viz.series.iter().enumerate() {
        let effective_type = series.chart_type.unwrap_or(viz.chart_type);
        if mixed && !effective_type.is_cartesian_2d() {
            return Err(CoreError::IncompatibleMixedSeries {
                chart_type: effective_type.as_str().to_string(),
                label: series.display_label().to_string(),
            });
        }

        let job = jobs.ingestion(&series.job_id)?;
        if job.project_id != viz.project_id {
            return Err(CoreError::InvalidJob(format!(
                "series {} references a dataset in another project",
                index + 1
            )));
        }
        if job.status != JobStatus::Success {
            return Err(CoreError::InvalidJob(format!(
                "series {} dataset '{}' has not finished ingestion",
                index + 1,
                job.filename
            )));
        }

        if effective_type.requires_z() && series.z_axis.is_none() {
            return Err(CoreError::InvalidJob(format!(
                "series {} requires a z axis for {} charts",
                index + 1,
                effective_type
            )));
        }

        let base_columns = job.columns.clone().unwrap_or_default();
        let derived_specs = derived::normalize(&series.derived_columns)?;
        if !derived_specs.is_empty() {
            derived::validate(&base_columns, &derived_specs)?;
        }
        let derived_names: Vec<&str> = derived_specs.iter().map(|s| s.name.as_str()).collect();

        let mut targets: Vec<&str> = vec![series.x_axis.as_str(), series.y_axis.as_str()];
        if let Some(z) = series.z_axis.as_deref() {
            targets.push(z);
        }
        for target in &targets {
            let known = base_columns.iter().any(|c| c == target)
                || derived_names.iter().any(|n| n == target);
            if !known {
                return Err(CoreError::ColumnNotFound {
                    column: target.to_string(),
                    context: format!("series {}", index + 1),
                });
            }
        }

        // Log-scale fast-fail from ingest-time stats, before any scan.
        if let Some(stats) = job.stats.as_ref() {
            for (axis, scale) in [
                (series.x_axis.as_str(), series.x_scale),
                (series.y_axis.as_str(), series.y_scale),
            ] {
                if scale.is_log() {
                    if let Some(column_stats) = stats.get(axis) {
                        if column_stats.min <= 0.0 {
                            return Err(CoreError::LogScaleInvalid {
                                column: axis.to_string(),
                                observed_min: column_stats.min,
                            });
                        }
                    }
                }
            }
        }

        let formula = derived::build_formula_plan(&base_columns, &derived_specs, &targets)?;
        let source = source_for(settings, &job)?;

        plans.push(SeriesPlan {
            series: series.clone(),
            effective_type,
            family: effective_type.family(),
            source,
            formula,
            base_columns,
            job,
        });
    }

    Ok(VizPlan {
        chart_type: viz.chart_type,
        mixed,
        series: plans,
        mat: None,
    })
}

/// Prefer the processed columnar artifact; fall back to reparsing the raw
/// upload with the job's parser settings.
fn source_for(settings: &Settings, job: &IngestionJob) -> CoreResult<SeriesSource> {
    if let Some(processed_key) = job.processed_key.as_ref() {
        return Ok(SeriesSource {
            bucket: settings.ingestion_bucket.clone(),
            key: processed_key.clone(),
            kind: SourceKind::Parquet,
        });
    }

    let ext = extension_of(&job.filename);
    let format = TableFormat::detect(&ext, job.dataset_family).ok_or_else(|| {
        CoreError::UnsupportedFormat(format!("extension '{ext}' is not readable for visualization"))
    })?;
    if format == TableFormat::Mat {
        return Err(CoreError::UnsupportedFormat(
            "MAT uploads visualize through the MAT route".to_string(),
        ));
    }

    Ok(SeriesSource {
        bucket: settings.ingestion_bucket.clone(),
        key: job.raw_key.clone(),
        kind: SourceKind::Text {
            format,
            header_mode: job.header_mode,
            custom_headers: job.custom_headers.clone(),
            sheet_name: job.sheet_name.clone(),
            parse_range: job.parse_range,
        },
    })
}
