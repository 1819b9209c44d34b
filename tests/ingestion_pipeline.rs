use std::io::Cursor;
use std::sync::Arc;

use flightdata_core::artifact::ArtifactReader;
use flightdata_core::config::Settings;
use flightdata_core::ingestion::IngestionCoordinator;
use flightdata_core::store::{FsObjectStore, JobStore, MemoryJobStore, ObjectStore, ProgressChannel};
use flightdata_core::types::{
    DatasetFamily, DerivedSpec, HeaderMode, IngestionJob, JobKind, JobStatus,
};
use flightdata_core::worker::{JobTask, WorkerPool};

struct Fixture {
    _dir: tempfile::TempDir,
    objects: Arc<FsObjectStore>,
    jobs: Arc<MemoryJobStore>,
    progress: Arc<ProgressChannel>,
    settings: Settings,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let objects = Arc::new(FsObjectStore::new(dir.path()));
    let settings = Settings::default();
    objects.ensure_bucket(&settings.ingestion_bucket).unwrap();
    Fixture {
        _dir: dir,
        objects,
        jobs: Arc::new(MemoryJobStore::new()),
        progress: Arc::new(ProgressChannel::new()),
        settings,
    }
}

fn upload(fx: &Fixture, key: &str, body: &str) {
    fx.objects
        .put_object(
            &fx.settings.ingestion_bucket,
            key,
            &mut Cursor::new(body.as_bytes().to_vec()),
            body.len() as u64,
            "text/csv",
        )
        .unwrap();
}

fn job(id: &str, filename: &str, raw_key: &str) -> IngestionJob {
    IngestionJob {
        id: id.to_string(),
        project_id: "p1".to_string(),
        owner_email: "pilot@example.com".to_string(),
        filename: filename.to_string(),
        raw_key: raw_key.to_string(),
        processed_key: None,
        dataset_family: DatasetFamily::Flight,
        tag_name: "run4".to_string(),
        content_type: Some("text/csv".to_string()),
        size_bytes: None,
        header_mode: HeaderMode::File,
        custom_headers: None,
        sheet_name: None,
        parse_range: None,
        mat_config: None,
        derived_columns: Vec::new(),
        visualize_enabled: true,
        status: JobStatus::Queued,
        progress: 0,
        message: None,
        created_at: 1,
        updated_at: 1,
        columns: None,
        rows_seen: None,
        sample_rows: None,
        stats: None,
        mat_meta: None,
    }
}

fn coordinator(fx: &Fixture) -> IngestionCoordinator {
    IngestionCoordinator::new(
        fx.objects.clone(),
        fx.jobs.clone(),
        fx.progress.clone(),
        fx.settings.clone(),
    )
}

#[test]
fn csv_ingestion_materializes_artifact_and_persists_summary() {
    let fx = fixture();
    upload(&fx, "p1/Flight_Data/run4/raw/j1_run.csv", "a,b\n1,2\n3,4\n");
    fx.jobs
        .insert_ingestion(job("j1", "run.csv", "p1/Flight_Data/run4/raw/j1_run.csv"))
        .unwrap();

    let events = fx.progress.subscribe(JobKind::Ingestion, "j1");
    coordinator(&fx).run("j1").unwrap();

    let done = fx.jobs.ingestion("j1").unwrap();
    assert_eq!(done.status, JobStatus::Success);
    assert_eq!(done.progress, 100);
    assert_eq!(done.columns.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
    assert_eq!(done.rows_seen, Some(2));
    let processed_key = done.processed_key.expect("tabular success sets processed key");
    assert_eq!(processed_key, "p1/Flight_Data/run4/processed/j1_run.parquet");

    // Columns/rows on the document match the artifact exactly.
    let stream = fx
        .objects
        .get_object(&fx.settings.ingestion_bucket, &processed_key)
        .unwrap();
    let reader = ArtifactReader::from_stream(stream).unwrap();
    assert_eq!(reader.columns(), ["a", "b"]);
    assert_eq!(reader.num_rows(), 2);

    // Progress is nondecreasing and ends terminal.
    let seen: Vec<_> = events.try_iter().collect();
    assert!(seen.len() >= 3);
    assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));
    assert_eq!(seen.last().unwrap().status, JobStatus::Success);
    assert_eq!(seen.last().unwrap().progress, 100);
}

#[test]
fn derived_columns_are_materialized_into_the_artifact() {
    let fx = fixture();
    upload(&fx, "p1/Flight_Data/run4/raw/j2_run.csv", "a,b\n3,4\n");
    let mut j = job("j2", "run.csv", "p1/Flight_Data/run4/raw/j2_run.csv");
    j.derived_columns = vec![
        DerivedSpec::new("c", "[a]+[b]"),
        DerivedSpec::new("d", "sqrt(([a]*[a])+([b]*[b]))"),
    ];
    fx.jobs.insert_ingestion(j).unwrap();

    coordinator(&fx).run("j2").unwrap();

    let done = fx.jobs.ingestion("j2").unwrap();
    assert_eq!(
        done.columns.as_deref(),
        Some(&["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()][..])
    );
    assert_eq!(done.stats.as_ref().unwrap()["c"].max, 7.0);
    assert_eq!(done.stats.as_ref().unwrap()["d"].max, 5.0);

    let stream = fx
        .objects
        .get_object(&fx.settings.ingestion_bucket, done.processed_key.as_ref().unwrap())
        .unwrap();
    let frame = ArtifactReader::from_stream(stream)
        .unwrap()
        .read_all(None)
        .unwrap();
    assert_eq!(frame.numeric_by_name("c", "t").unwrap(), vec![Some(7.0)]);
    assert_eq!(frame.numeric_by_name("d", "t").unwrap(), vec![Some(5.0)]);
}

#[test]
fn failure_persists_message_and_keeps_the_raw_key() {
    let fx = fixture();
    upload(&fx, "p1/Flight_Data/run4/raw/j3_run.csv", "1,2,3\n");
    let mut j = job("j3", "run.csv", "p1/Flight_Data/run4/raw/j3_run.csv");
    j.header_mode = HeaderMode::Custom;
    j.custom_headers = Some(vec!["only_one".to_string()]);
    fx.jobs.insert_ingestion(j).unwrap();

    let events = fx.progress.subscribe(JobKind::Ingestion, "j3");
    let err = coordinator(&fx).run("j3").unwrap_err();
    assert!(err.to_string().contains("invalid header spec"));

    let done = fx.jobs.ingestion("j3").unwrap();
    assert_eq!(done.status, JobStatus::Failure);
    assert_eq!(done.progress, 100);
    assert!(done.message.unwrap().contains("invalid header spec"));
    assert!(done.processed_key.is_none());

    // Raw object untouched.
    assert!(
        fx.objects
            .stat_object(&fx.settings.ingestion_bucket, "p1/Flight_Data/run4/raw/j3_run.csv")
            .is_ok()
    );

    let seen: Vec<_> = events.try_iter().collect();
    assert_eq!(seen.last().unwrap().status, JobStatus::Failure);
}

#[test]
fn storage_only_uploads_finalize_as_stored() {
    let fx = fixture();
    upload(&fx, "p1/Flight_Data/run4/raw/j4_notes.pdf", "%PDF-1.4 ...");
    let mut j = job("j4", "notes.pdf", "p1/Flight_Data/run4/raw/j4_notes.pdf");
    j.visualize_enabled = false;
    fx.jobs.insert_ingestion(j).unwrap();

    coordinator(&fx).run("j4").unwrap();

    let done = fx.jobs.ingestion("j4").unwrap();
    assert_eq!(done.status, JobStatus::Success);
    assert_eq!(done.message.as_deref(), Some("stored (non-tabular)"));
    assert!(done.processed_key.is_none());
}

#[test]
fn unsupported_extension_with_parsing_requested_fails() {
    let fx = fixture();
    upload(&fx, "p1/Flight_Data/run4/raw/j5_img.png", "not an image");
    fx.jobs
        .insert_ingestion(job("j5", "img.png", "p1/Flight_Data/run4/raw/j5_img.png"))
        .unwrap();

    let err = coordinator(&fx).run("j5").unwrap_err();
    assert!(err.to_string().contains("unsupported format"));
}

#[test]
fn rerun_overwrites_by_key_and_reaches_the_same_terminal_state() {
    let fx = fixture();
    upload(&fx, "p1/Flight_Data/run4/raw/j6_run.csv", "a\n1\n2\n");
    fx.jobs
        .insert_ingestion(job("j6", "run.csv", "p1/Flight_Data/run4/raw/j6_run.csv"))
        .unwrap();

    let coordinator = coordinator(&fx);
    coordinator.run("j6").unwrap();
    let first = fx.jobs.ingestion("j6").unwrap();

    // Redelivery: identical inputs, identical outcome.
    coordinator.run("j6").unwrap();
    let second = fx.jobs.ingestion("j6").unwrap();
    assert_eq!(first.columns, second.columns);
    assert_eq!(first.rows_seen, second.rows_seen);
    assert_eq!(first.processed_key, second.processed_key);
}

#[test]
fn deleting_a_job_removes_its_objects_before_the_document() {
    let fx = fixture();
    upload(&fx, "p1/Flight_Data/run4/raw/j8_run.csv", "a\n1\n");
    fx.jobs
        .insert_ingestion(job("j8", "run.csv", "p1/Flight_Data/run4/raw/j8_run.csv"))
        .unwrap();

    let coordinator = coordinator(&fx);
    coordinator.run("j8").unwrap();
    let processed_key = fx.jobs.ingestion("j8").unwrap().processed_key.unwrap();

    coordinator.delete("j8").unwrap();
    assert!(fx.jobs.ingestion("j8").is_err());
    assert!(
        fx.objects
            .stat_object(&fx.settings.ingestion_bucket, "p1/Flight_Data/run4/raw/j8_run.csv")
            .is_err()
    );
    assert!(
        fx.objects
            .stat_object(&fx.settings.ingestion_bucket, &processed_key)
            .is_err()
    );
}

#[test]
fn worker_pool_drives_jobs_to_completion() {
    let fx = fixture();
    upload(&fx, "p1/Flight_Data/run4/raw/j7_run.csv", "a\n5\n");
    fx.jobs
        .insert_ingestion(job("j7", "run.csv", "p1/Flight_Data/run4/raw/j7_run.csv"))
        .unwrap();

    let pool = WorkerPool::new(
        fx.objects.clone(),
        fx.jobs.clone(),
        fx.progress.clone(),
        fx.settings.clone(),
    )
    .unwrap();

    pool.submit(JobTask::Ingestion("j7".to_string()));
    pool.wait_idle();

    assert_eq!(fx.jobs.ingestion("j7").unwrap().status, JobStatus::Success);
    let metrics = pool.metrics();
    assert_eq!(metrics.submitted, 1);
    assert_eq!(metrics.succeeded, 1);
}
