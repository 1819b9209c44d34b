//! Job document store.
//!
//! One trait over the two collections (`ingestion_jobs`, `visualizations`),
//! queried by id and by project. Updates are closure patches applied under
//! the store's lock: concurrent writers to the same document are last-writer-
//! wins at field granularity, and `updated_at` is bumped on every patch.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::types::{IngestionJob, VisualizationJob};

use super::now_ts;

/// Document-database gateway for job records.
pub trait JobStore: Send + Sync {
    fn insert_ingestion(&self, job: IngestionJob) -> CoreResult<()>;

    fn ingestion(&self, id: &str) -> CoreResult<IngestionJob>;

    /// Apply a field patch to an ingestion job and bump `updated_at`.
    fn update_ingestion(&self, id: &str, patch: &mut dyn FnMut(&mut IngestionJob))
    -> CoreResult<()>;

    /// Remove an ingestion job, returning the final document so the caller
    /// can clean up its object keys.
    fn delete_ingestion(&self, id: &str) -> CoreResult<IngestionJob>;

    fn ingestions_for_project(&self, project_id: &str) -> CoreResult<Vec<IngestionJob>>;

    fn insert_visualization(&self, job: VisualizationJob) -> CoreResult<()>;

    fn visualization(&self, id: &str) -> CoreResult<VisualizationJob>;

    fn update_visualization(
        &self,
        id: &str,
        patch: &mut dyn FnMut(&mut VisualizationJob),
    ) -> CoreResult<()>;

    fn delete_visualization(&self, id: &str) -> CoreResult<VisualizationJob>;

    fn visualizations_for_project(&self, project_id: &str) -> CoreResult<Vec<VisualizationJob>>;
}

/// In-memory [`JobStore`] used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    ingestions: Mutex<HashMap<String, IngestionJob>>,
    visualizations: Mutex<HashMap<String, VisualizationJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert_ingestion(&self, job: IngestionJob) -> CoreResult<()> {
        let mut map = self.ingestions.lock().expect("job store mutex poisoned");
        map.insert(job.id.clone(), job);
        Ok(())
    }

    fn ingestion(&self, id: &str) -> CoreResult<IngestionJob> {
        let map = self.ingestions.lock().expect("job store mutex poisoned");
        map.get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("ingestion job {id}")))
    }

    fn update_ingestion(
        &self,
        id: &str,
        patch: &mut dyn FnMut(&mut IngestionJob),
    ) -> CoreResult<()> {
        let mut map = self.ingestions.lock().expect("job store mutex poisoned");
        let job = map
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("ingestion job {id}")))?;
        patch(job);
        job.updated_at = now_ts();
        Ok(())
    }

    fn delete_ingestion(&self, id: &str) -> CoreResult<IngestionJob> {
        let mut map = self.ingestions.lock().expect("job store mutex poisoned");
        map.remove(id)
            .ok_or_else(|| CoreError::NotFound(format!("ingestion job {id}")))
    }

    fn ingestions_for_project(&self, project_id: &str) -> CoreResult<Vec<IngestionJob>> {
        let map = self.ingestions.lock().expect("job store mutex poisoned");
        let mut jobs: Vec<IngestionJob> = map
            .values()
            .filter(|j| j.project_id == project_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    fn insert_visualization(&self, job: VisualizationJob) -> CoreResult<()> {
        let mut map = self.visualizations.lock().expect("job store mutex poisoned");
        map.insert(job.id.clone(), job);
        Ok(())
    }

    fn visualization(&self, id: &str) -> CoreResult<VisualizationJob> {
        let map = self.visualizations.lock().expect("job store mutex poisoned");
        map.get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("visualization {id}")))
    }

    fn update_visualization(
        &self,
        id: &str,
        patch: &mut dyn FnMut(&mut VisualizationJob),
    ) -> CoreResult<()> {
        let mut map = self.visualizations.lock().expect("job store mutex poisoned");
        let job = map
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("visualization {id}")))?;
        patch(job);
        job.updated_at = now_ts();
        Ok(())
    }

    fn delete_visualization(&self, id: &str) -> CoreResult<VisualizationJob> {
        let mut map = self.visualizations.lock().expect("job store mutex poisoned");
        map.remove(id)
            .ok_or_else(|| CoreError::NotFound(format!("visualization {id}")))
    }

    fn visualizations_for_project(&self, project_id: &str) -> CoreResult<Vec<VisualizationJob>> {
        let map = self.visualizations.lock().expect("job store mutex poisoned");
        let mut jobs: Vec<VisualizationJob> = map
            .values()
            .filter(|j| j.project_id == project_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::{JobStore, MemoryJobStore};
    use crate::types::{DatasetFamily, HeaderMode, IngestionJob, JobStatus};

    fn job(id: &str, project: &str) -> IngestionJob {
        IngestionJob {
            id: id.to_string(),
            project_id: project.to_string(),
            owner_email: "pilot@example.com".to_string(),
            filename: "run.csv".to_string(),
            raw_key: format!("{project}/CFD/t/raw/{id}_run.csv"),
            processed_key: None,
            dataset_family: DatasetFamily::Cfd,
            tag_name: "t".to_string(),
            content_type: Some("text/csv".to_string()),
            size_bytes: Some(10),
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
            created_at: 100,
            updated_at: 100,
            columns: None,
            rows_seen: None,
            sample_rows: None,
            stats: None,
            mat_meta: None,
        }
    }

    #[test]
    fn update_patches_fields_and_bumps_timestamp() {
        let store = MemoryJobStore::new();
        store.insert_ingestion(job("j1", "p1")).unwrap();

        store
            .update_ingestion("j1", &mut |j| {
                j.status = JobStatus::Started;
                j.progress = 25;
            })
            .unwrap();

        let got = store.ingestion("j1").unwrap();
        assert_eq!(got.status, JobStatus::Started);
        assert_eq!(got.progress, 25);
        assert!(got.updated_at >= got.created_at);
    }

    #[test]
    fn missing_jobs_surface_not_found() {
        let store = MemoryJobStore::new();
        assert!(store.ingestion("nope").is_err());
        assert!(store.update_ingestion("nope", &mut |_| {}).is_err());
    }

    #[test]
    fn project_listing_filters_other_projects() {
        let store = MemoryJobStore::new();
        store.insert_ingestion(job("j1", "p1")).unwrap();
        store.insert_ingestion(job("j2", "p2")).unwrap();
        store.insert_ingestion(job("j3", "p1")).unwrap();

        let jobs = store.ingestions_for_project("p1").unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.project_id == "p1"));
    }
}
