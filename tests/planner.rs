use std::collections::BTreeMap;
use std::sync::Arc;

use flightdata_core::CoreError;
use flightdata_core::config::Settings;
use flightdata_core::store::{JobStore, MemoryJobStore};
use flightdata_core::types::{
    AxisMapping, AxisScale, ChartFamily, ChartType, ColumnStats, DatasetFamily, HeaderMode,
    IngestionJob, JobStatus, MatRequest, Series, SourceType, VisualizationJob,
};
use flightdata_core::viz::plan;

fn ingestion_job(id: &str, project: &str) -> IngestionJob {
    IngestionJob {
        id: id.to_string(),
        project_id: project.to_string(),
        owner_email: "pilot@example.com".to_string(),
        filename: "run.csv".to_string(),
        raw_key: format!("{project}/CFD/t/raw/{id}_run.csv"),
        processed_key: Some(format!("{project}/CFD/t/processed/{id}_run.parquet")),
        dataset_family: DatasetFamily::Cfd,
        tag_name: "t".to_string(),
        content_type: None,
        size_bytes: None,
        header_mode: HeaderMode::File,
        custom_headers: None,
        sheet_name: None,
        parse_range: None,
        mat_config: None,
        derived_columns: Vec::new(),
        visualize_enabled: true,
        status: JobStatus::Success,
        progress: 100,
        message: None,
        created_at: 1,
        updated_at: 1,
        columns: Some(vec!["x".to_string(), "y".to_string(), "z".to_string()]),
        rows_seen: Some(1000),
        sample_rows: None,
        stats: Some(BTreeMap::from([
            ("x".to_string(), ColumnStats { min: 1.0, max: 9.0 }),
            ("y".to_string(), ColumnStats { min: -3.0, max: 3.0 }),
        ])),
        mat_meta: None,
    }
}

fn series(job_id: &str) -> Series {
    Series {
        job_id: job_id.to_string(),
        x_axis: "x".to_string(),
        y_axis: "y".to_string(),
        z_axis: None,
        label: None,
        x_scale: AxisScale::Linear,
        y_scale: AxisScale::Linear,
        chart_type: None,
        derived_columns: Vec::new(),
    }
}

fn viz_job(chart_type: ChartType, series_list: Vec<Series>) -> VisualizationJob {
    VisualizationJob {
        id: "v1".to_string(),
        project_id: "p1".to_string(),
        source_type: SourceType::Tabular,
        chart_type,
        series: series_list,
        mat_request: None,
        status: JobStatus::Queued,
        progress: 0,
        message: None,
        artifact_key: None,
        tiles: Vec::new(),
        series_stats: Vec::new(),
        created_at: 1,
        updated_at: 1,
    }
}

fn store_with_job(job: IngestionJob) -> Arc<dyn JobStore> {
    let store = MemoryJobStore::new();
    store.insert_ingestion(job).unwrap();
    Arc::new(store)
}

#[test]
fn scatter_classifies_tiled_and_prefers_processed_source() {
    let jobs = store_with_job(ingestion_job("j1", "p1"));
    let viz = viz_job(ChartType::Scatter, vec![series("j1")]);

    let out = plan(&jobs, &Settings::default(), &viz).unwrap();
    assert_eq!(out.series.len(), 1);
    assert_eq!(out.series[0].family, ChartFamily::Tiled);
    assert!(out.series[0].source.key.ends_with(".parquet"));
    assert!(out.any_tiled());
}

#[test]
fn histogram_classifies_raw() {
    let jobs = store_with_job(ingestion_job("j1", "p1"));
    let viz = viz_job(ChartType::Histogram, vec![series("j1")]);
    let out = plan(&jobs, &Settings::default(), &viz).unwrap();
    assert_eq!(out.series[0].family, ChartFamily::Raw);
    assert!(!out.any_tiled());
}

#[test]
fn replanning_yields_the_same_classification_and_order() {
    let store = MemoryJobStore::new();
    store.insert_ingestion(ingestion_job("j1", "p1")).unwrap();
    store.insert_ingestion(ingestion_job("j2", "p1")).unwrap();
    let jobs: Arc<dyn JobStore> = Arc::new(store);

    let viz = viz_job(ChartType::Line, vec![series("j1"), series("j2")]);
    let first = plan(&jobs, &Settings::default(), &viz).unwrap();
    let second = plan(&jobs, &Settings::default(), &viz).unwrap();

    let shape = |p: &flightdata_core::viz::VizPlan| {
        p.series
            .iter()
            .map(|s| (s.series.job_id.clone(), s.effective_type, s.family))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&first), shape(&second));
}

#[test]
fn mixed_overrides_outside_2d_cartesian_fail() {
    let jobs = store_with_job(ingestion_job("j1", "p1"));
    let mut polar = series("j1");
    polar.chart_type = Some(ChartType::Polar);
    let viz = viz_job(ChartType::Scatter, vec![series("j1"), polar]);

    let err = plan(&jobs, &Settings::default(), &viz).unwrap_err();
    assert!(matches!(err, CoreError::IncompatibleMixedSeries { .. }));
}

#[test]
fn mixed_overrides_within_2d_cartesian_pass() {
    let jobs = store_with_job(ingestion_job("j1", "p1"));
    let mut bar = series("j1");
    bar.chart_type = Some(ChartType::Bar);
    let viz = viz_job(ChartType::Scatter, vec![series("j1"), bar]);

    let out = plan(&jobs, &Settings::default(), &viz).unwrap();
    assert!(out.mixed);
    assert_eq!(out.series[1].effective_type, ChartType::Bar);
}

#[test]
fn missing_column_fails_citing_column_and_series() {
    let jobs = store_with_job(ingestion_job("j1", "p1"));
    let mut bad = series("j1");
    bad.y_axis = "ghost".to_string();
    let viz = viz_job(ChartType::Line, vec![bad]);

    match plan(&jobs, &Settings::default(), &viz).unwrap_err() {
        CoreError::ColumnNotFound { column, context } => {
            assert_eq!(column, "ghost");
            assert!(context.contains("series 1"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn log_scale_fast_fails_from_stored_stats() {
    let jobs = store_with_job(ingestion_job("j1", "p1"));
    let mut log_y = series("j1");
    log_y.y_scale = AxisScale::Log;
    let viz = viz_job(ChartType::Line, vec![log_y]);

    match plan(&jobs, &Settings::default(), &viz).unwrap_err() {
        CoreError::LogScaleInvalid { column, observed_min } => {
            assert_eq!(column, "y");
            assert_eq!(observed_min, -3.0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn contour_requires_a_z_axis() {
    let jobs = store_with_job(ingestion_job("j1", "p1"));
    let viz = viz_job(ChartType::Contour, vec![series("j1")]);
    assert!(plan(&jobs, &Settings::default(), &viz).is_err());

    let mut with_z = series("j1");
    with_z.z_axis = Some("z".to_string());
    let viz = viz_job(ChartType::Contour, vec![with_z]);
    let out = plan(&jobs, &Settings::default(), &viz).unwrap();
    assert_eq!(out.series[0].family, ChartFamily::Raw);
}

#[test]
fn cross_project_and_unfinished_jobs_are_rejected() {
    let store = MemoryJobStore::new();
    store.insert_ingestion(ingestion_job("other", "p2")).unwrap();
    let mut pending = ingestion_job("pending", "p1");
    pending.status = JobStatus::Started;
    store.insert_ingestion(pending).unwrap();
    let jobs: Arc<dyn JobStore> = Arc::new(store);

    let viz = viz_job(ChartType::Line, vec![series("other")]);
    assert!(plan(&jobs, &Settings::default(), &viz).is_err());

    let viz = viz_job(ChartType::Line, vec![series("pending")]);
    assert!(plan(&jobs, &Settings::default(), &viz).is_err());
}

#[test]
fn mat_route_validates_request_and_chart_type() {
    let mut mat_job = ingestion_job("m1", "p1");
    mat_job.filename = "wing.mat".to_string();
    let jobs = store_with_job(mat_job);

    let request = MatRequest {
        job_id: "m1".to_string(),
        var: "CL".to_string(),
        mapping: BTreeMap::from([(
            "x".to_string(),
            AxisMapping { dim: 0, coord: None },
        )]),
        filters: BTreeMap::new(),
    };

    let mut viz = viz_job(ChartType::Line, Vec::new());
    viz.source_type = SourceType::Mat;
    viz.mat_request = Some(request.clone());
    let out = plan(&jobs, &Settings::default(), &viz).unwrap();
    assert!(out.mat.is_some());
    assert!(out.series.is_empty());

    // Box charts are not a MAT chart type.
    let mut bad = viz.clone();
    bad.chart_type = ChartType::Box;
    assert!(plan(&jobs, &Settings::default(), &bad).is_err());

    // A non-.mat upload cannot serve the MAT route.
    let mut tabular_job = ingestion_job("t1", "p1");
    tabular_job.filename = "run.csv".to_string();
    let jobs2 = store_with_job(tabular_job);
    let mut wrong = viz.clone();
    wrong.mat_request = Some(MatRequest {
        job_id: "t1".to_string(),
        ..request
    });
    assert!(plan(&jobs2, &Settings::default(), &wrong).is_err());
}
