use std::io::Cursor;
use std::sync::Arc;

use flightdata_core::CoreError;
use flightdata_core::artifact::frame_to_parquet_bytes;
use flightdata_core::config::Settings;
use flightdata_core::frame::{Column, Frame};
use flightdata_core::store::{FsObjectStore, JobStore, MemoryJobStore, ObjectStore};
use flightdata_core::types::{
    AxisScale, ChartType, DatasetFamily, HeaderMode, IngestionJob, JobStatus, Series, SourceType,
    TileDescriptor, TileStats, VisualizationJob,
};
use flightdata_core::viz::{LOD_LEVELS, ZoomMode, ZoomQuery, choose_mode};

fn tile_frame(y_name: &str) -> Frame {
    Frame::new(
        vec![
            "x".to_string(),
            "count".to_string(),
            y_name.to_string(),
            "y_min".to_string(),
            "y_max".to_string(),
        ],
        vec![
            Column::Float64(vec![Some(5.0), Some(15.0), Some(25.0)]),
            Column::Float64(vec![Some(10.0), Some(10.0), Some(10.0)]),
            Column::Float64(vec![Some(1.0), Some(2.0), Some(3.0)]),
            Column::Float64(vec![Some(0.5), Some(1.5), Some(2.5)]),
            Column::Float64(vec![Some(1.5), Some(2.5), Some(3.5)]),
        ],
    )
}

struct Fixture {
    _dir: tempfile::TempDir,
    query: ZoomQuery,
}

fn fixture(with_processed: bool, legacy_tile_column: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let objects = Arc::new(FsObjectStore::new(dir.path()));
    let jobs = Arc::new(MemoryJobStore::new());
    let settings = Settings::default();

    objects.ensure_bucket(&settings.ingestion_bucket).unwrap();
    objects.ensure_bucket(&settings.visualization_bucket).unwrap();

    // Processed XY artifact with 100 rows: y = 2x.
    let processed_key = "p1/CFD/t/processed/j1_run.parquet".to_string();
    if with_processed {
        let frame = Frame::new(
            vec!["x".to_string(), "y".to_string()],
            vec![
                Column::Float64((0..100).map(|i| Some(i as f64)).collect()),
                Column::Float64((0..100).map(|i| Some((i * 2) as f64)).collect()),
            ],
        );
        let bytes = frame_to_parquet_bytes(&frame).unwrap();
        let len = bytes.len() as u64;
        objects
            .put_object(
                &settings.ingestion_bucket,
                &processed_key,
                &mut Cursor::new(bytes),
                len,
                "application/octet-stream",
            )
            .unwrap();
    }

    // Tiles at two levels; the mean column is named either `y` or `y_mean`.
    let mut descriptors = Vec::new();
    for level in [256usize, 1024] {
        let key = format!("projects/p1/visualizations/v1/series_1/level_{level}.parquet");
        let column = if legacy_tile_column { "y_mean" } else { "y" };
        let bytes = frame_to_parquet_bytes(&tile_frame(column)).unwrap();
        let len = bytes.len() as u64;
        objects
            .put_object(
                &settings.visualization_bucket,
                &key,
                &mut Cursor::new(bytes),
                len,
                "application/octet-stream",
            )
            .unwrap();
        descriptors.push(TileDescriptor {
            level,
            object_key: key,
            rows: 3,
            x_min: 0.0,
            x_max: 30.0,
        });
    }

    jobs.insert_ingestion(IngestionJob {
        id: "j1".to_string(),
        project_id: "p1".to_string(),
        owner_email: "pilot@example.com".to_string(),
        filename: "run.csv".to_string(),
        raw_key: "p1/CFD/t/raw/j1_run.csv".to_string(),
        processed_key: with_processed.then(|| processed_key.clone()),
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
        columns: Some(vec!["x".to_string(), "y".to_string()]),
        rows_seen: Some(100),
        sample_rows: None,
        stats: None,
        mat_meta: None,
    })
    .unwrap();

    jobs.insert_visualization(VisualizationJob {
        id: "v1".to_string(),
        project_id: "p1".to_string(),
        source_type: SourceType::Tabular,
        chart_type: ChartType::Line,
        series: vec![Series {
            job_id: "j1".to_string(),
            x_axis: "x".to_string(),
            y_axis: "y".to_string(),
            z_axis: None,
            label: None,
            x_scale: AxisScale::Linear,
            y_scale: AxisScale::Linear,
            chart_type: None,
            derived_columns: Vec::new(),
        }],
        mat_request: None,
        status: JobStatus::Success,
        progress: 100,
        message: None,
        artifact_key: Some("projects/p1/visualizations/v1.html".to_string()),
        tiles: vec![descriptors],
        series_stats: vec![Some(TileStats {
            x_min: 0.0,
            x_max: 30.0,
            rows: 100,
            partitions: 1,
        })],
        created_at: 1,
        updated_at: 1,
    })
    .unwrap();

    Fixture {
        _dir: dir,
        query: ZoomQuery::new(objects, jobs, settings),
    }
}

#[test]
fn tiles_default_to_the_coarsest_level() {
    let fx = fixture(true, false);
    let response = fx.query.tiles("v1", 0, None, None, None).unwrap();
    assert_eq!(response.level, 256);
    assert_eq!(response.rows, 3);
    assert_eq!(response.data[0]["x"], serde_json::json!(5.0));
    assert_eq!(response.data[0]["y"], serde_json::json!(1.0));
}

#[test]
fn tile_window_filters_rows_inclusively() {
    let fx = fixture(true, false);
    let response = fx
        .query
        .tiles("v1", 0, Some(1024), Some(15.0), Some(30.0))
        .unwrap();
    assert_eq!(response.level, 1024);
    assert_eq!(response.rows, 2);
    assert_eq!(response.data[0]["x"], serde_json::json!(15.0));
}

#[test]
fn legacy_tiles_alias_y_mean_to_the_y_axis() {
    let fx = fixture(true, true);
    let response = fx.query.tiles("v1", 0, None, None, None).unwrap();
    assert_eq!(response.data[1]["y"], serde_json::json!(2.0));
    assert!(response.data[1].get("y_mean").is_none());
}

#[test]
fn unknown_levels_and_series_are_not_found() {
    let fx = fixture(true, false);
    assert!(matches!(
        fx.query.tiles("v1", 0, Some(4096), None, None).unwrap_err(),
        CoreError::NotFound(_)
    ));
    assert!(matches!(
        fx.query.tiles("v1", 9, None, None, None).unwrap_err(),
        CoreError::NotFound(_)
    ));
    assert!(matches!(
        fx.query.tiles("missing", 0, None, None, None).unwrap_err(),
        CoreError::NotFound(_)
    ));
}

#[test]
fn raw_reads_window_sorted_ascending() {
    let fx = fixture(true, false);
    let response = fx
        .query
        .raw("v1", 0, Some(10.0), Some(20.0), None)
        .unwrap();
    assert_eq!(response.rows, 11);
    assert_eq!(response.x_axis, "x");
    assert_eq!(response.data[0]["x"], serde_json::json!(10.0));
    assert_eq!(response.data[10]["x"], serde_json::json!(20.0));
    assert_eq!(response.data[5]["y"], serde_json::json!(30.0));

    let xs: Vec<f64> = response
        .data
        .iter()
        .map(|row| row["x"].as_f64().unwrap())
        .collect();
    assert!(xs.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn raw_downsamples_deterministically_over_budget() {
    let fx = fixture(true, false);
    let a = fx.query.raw("v1", 0, None, None, Some(10)).unwrap();
    let b = fx.query.raw("v1", 0, None, None, Some(10)).unwrap();
    assert_eq!(a.rows, 10);
    assert_eq!(a.data, b.data);
}

#[test]
fn raw_without_processed_artifact_is_unavailable() {
    let fx = fixture(false, false);
    assert!(matches!(
        fx.query.raw("v1", 0, None, None, None).unwrap_err(),
        CoreError::RawNotAvailable(_)
    ));
}

#[test]
fn deep_zoom_scenario_switches_to_raw() {
    // Series stats {x_min: 0, x_max: 100, rows: 1_000_000}; zoom to [10, 11]
    // means ratio 0.01 and ~10k expected points: the loader must choose raw.
    let stats = TileStats {
        x_min: 0.0,
        x_max: 100.0,
        rows: 1_000_000,
        partitions: 8,
    };
    assert_eq!(
        choose_mode(Some(&stats), 10.0, 11.0, &LOD_LEVELS),
        ZoomMode::Raw
    );
}
