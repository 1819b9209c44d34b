//! Ingestion coordinator: drives one ingestion job to terminal status.
//!
//! Inputs are read from the job document; outputs are written back to the
//! document and to object storage. The coordinator never retries on its own;
//! the worker runtime may redeliver, and parsers are deterministic, so a
//! rerun simply overwrites the processed key.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{error, info};

use crate::artifact::ArtifactWriter;
use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;
use crate::store::{JobStore, ObjectStore, ProgressChannel};
use crate::types::{IngestionJob, JobKind, JobStatus};

use super::{FrameSink, ParserContext, TableFormat, extension_of, parse_and_profile};

/// Executes ingestion jobs against the configured stores.
pub struct IngestionCoordinator {
    objects: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobStore>,
    progress: Arc<ProgressChannel>,
    settings: Settings,
}

impl IngestionCoordinator {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobStore>,
        progress: Arc<ProgressChannel>,
        settings: Settings,
    ) -> Self {
        Self {
            objects,
            jobs,
            progress,
            settings,
        }
    }

    /// Run one job to terminal status. On failure the job document records
    /// `failure, 100, message` and the error is re-raised for the queue
    /// runtime; the raw key is never removed.
    pub fn run(&self, job_id: &str) -> CoreResult<()> {
        let job = self.jobs.ingestion(job_id)?;
        info!(job_id, filename = %job.filename, "ingestion started");

        match self.execute(&job) {
            Ok(()) => {
                info!(job_id, "ingestion finished");
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                error!(job_id, %message, "ingestion failed");
                let _ = self.jobs.update_ingestion(job_id, &mut |j| {
                    j.status = JobStatus::Failure;
                    j.progress = 100;
                    j.message = Some(message.clone());
                });
                self.progress
                    .publish(JobKind::Ingestion, job_id, JobStatus::Failure, 100, &message);
                Err(err)
            }
        }
    }

    fn execute(&self, job: &IngestionJob) -> CoreResult<()> {
        let job_id = job.id.as_str();
        self.set_progress(job_id, 5, "Downloading raw object")?;

        let ext = extension_of(&job.filename);
        let format = TableFormat::detect(&ext, job.dataset_family);

        // Storage-only uploads (and uploads of formats we cannot parse when
        // parsing was not requested) finalize without touching the payload.
        if !job.visualize_enabled {
            let message = "stored (non-tabular)";
            self.jobs.update_ingestion(job_id, &mut |j| {
                j.status = JobStatus::Success;
                j.progress = 100;
                j.message = Some(message.to_string());
            })?;
            self.progress
                .publish(JobKind::Ingestion, job_id, JobStatus::Success, 100, message);
            return Ok(());
        }

        let Some(format) = format else {
            return Err(CoreError::UnsupportedFormat(format!(
                "extension '{ext}' is not supported for parsing"
            )));
        };

        // Stream the raw object to a worker-scoped scratch file.
        let mut stream = self
            .objects
            .get_object(&self.settings.ingestion_bucket, &job.raw_key)?;
        let mut spool = NamedTempFile::new()?;
        io::copy(&mut stream, spool.as_file_mut())?;
        drop(stream);

        self.set_progress(job_id, 25, "Parsing file")?;

        let ctx = ParserContext {
            header_mode: job.header_mode,
            custom_headers: job.custom_headers.as_deref(),
            sheet_name: job.sheet_name.as_deref(),
            parse_range: job.parse_range,
            mat_config: job.mat_config.as_ref(),
        };

        let artifact_tmp = NamedTempFile::new()?;
        let mut artifact_sink = ArtifactSink::new(artifact_tmp.path().to_path_buf());
        let outcome = parse_and_profile(
            format,
            spool.path(),
            &ctx,
            &job.derived_columns,
            &mut artifact_sink,
        )?;
        let rows_written = artifact_sink.finish()?;

        let processed_key = match rows_written {
            Some(rows) => {
                self.set_progress(job_id, 85, "Writing columnar artifact")?;
                let key = job
                    .processed_key
                    .clone()
                    .unwrap_or_else(|| derive_processed_key(&job.raw_key));
                self.objects.ensure_bucket(&self.settings.ingestion_bucket)?;
                self.objects.fput_object(
                    &self.settings.ingestion_bucket,
                    &key,
                    artifact_tmp.path(),
                    "application/octet-stream",
                )?;
                info!(job_id, key = %key, rows, "processed artifact written");
                Some(key)
            }
            None => None,
        };

        let message = "Ingestion finished";
        self.jobs.update_ingestion(job_id, &mut |j| {
            j.status = JobStatus::Success;
            j.progress = 100;
            j.message = Some(message.to_string());
            j.columns = Some(outcome.columns.clone());
            j.rows_seen = Some(outcome.rows_seen);
            j.sample_rows = Some(outcome.sample_rows.clone());
            j.stats = Some(outcome.stats.clone());
            j.mat_meta = outcome.mat_meta.clone();
            j.processed_key = processed_key.clone();
        })?;
        self.progress
            .publish(JobKind::Ingestion, job_id, JobStatus::Success, 100, message);
        Ok(())
    }

    /// Delete a job: its raw and processed objects are removed best-effort
    /// before the document, so leftovers never outlive the record.
    pub fn delete(&self, job_id: &str) -> CoreResult<()> {
        let job = self.jobs.ingestion(job_id)?;
        let _ = self
            .objects
            .remove_object(&self.settings.ingestion_bucket, &job.raw_key);
        if let Some(processed_key) = job.processed_key.as_ref() {
            let _ = self
                .objects
                .remove_object(&self.settings.ingestion_bucket, processed_key);
        }
        self.jobs.delete_ingestion(job_id)?;
        Ok(())
    }

    fn set_progress(&self, job_id: &str, progress: u8, message: &str) -> CoreResult<()> {
        self.progress
            .publish(JobKind::Ingestion, job_id, JobStatus::Started, progress, message);
        self.jobs.update_ingestion(job_id, &mut |j| {
            j.status = JobStatus::Started;
            j.progress = progress;
        })
    }
}

/// Processed-artifact key derived from a raw key: the `raw` folder becomes
/// `processed` and the extension becomes `.parquet`.
pub fn derive_processed_key(raw_key: &str) -> String {
    let swapped = match raw_key.rfind("/raw/") {
        Some(idx) => format!("{}/processed/{}", &raw_key[..idx], &raw_key[idx + 5..]),
        None => raw_key.to_string(),
    };
    match swapped.rfind('.') {
        Some(idx) if !swapped[idx..].contains('/') => format!("{}.parquet", &swapped[..idx]),
        _ => format!("{swapped}.parquet"),
    }
}

/// Frame sink that lazily creates a parquet writer from the first frame's
/// schema and writes one row group per frame.
pub struct ArtifactSink {
    path: PathBuf,
    writer: Option<ArtifactWriter<File>>,
}

impl ArtifactSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path, writer: None }
    }

    /// Close the artifact. `None` means no frame ever arrived (metadata-only
    /// formats); `Some(rows)` is the total row count written.
    pub fn finish(self) -> CoreResult<Option<u64>> {
        match self.writer {
            Some(writer) => Ok(Some(writer.close()?)),
            None => Ok(None),
        }
    }
}

impl FrameSink for ArtifactSink {
    fn write_frame(&mut self, frame: &Frame) -> CoreResult<()> {
        if self.writer.is_none() {
            self.writer = Some(ArtifactWriter::create(
                Path::new(&self.path),
                frame.names(),
                &frame.kinds(),
            )?);
        }
        self.writer
            .as_mut()
            .expect("writer created above")
            .write_frame(frame)
    }
}
