//! Object storage gateway.
//!
//! [`ObjectStore`] mirrors the operation set of an S3-style store: streamed
//! get/put, file puts, stat, remove, presigned URLs and bucket management.
//! [`FsObjectStore`] maps buckets to directories under a root so the whole
//! pipeline runs against a local disk in tests and single-node deployments.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Metadata returned by [`ObjectStore::stat_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    pub content_type: Option<String>,
}

/// Streamed object-store operations used by the pipelines.
pub trait ObjectStore: Send + Sync {
    fn bucket_exists(&self, bucket: &str) -> CoreResult<bool>;

    fn make_bucket(&self, bucket: &str) -> CoreResult<()>;

    /// Open an object for streamed reading.
    fn get_object(&self, bucket: &str, key: &str) -> CoreResult<Box<dyn Read + Send>>;

    /// Write an object from a reader. `length` is advisory for backends that
    /// need it up front; the reader is drained regardless.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &mut dyn Read,
        length: u64,
        content_type: &str,
    ) -> CoreResult<()>;

    /// Upload a local file as an object.
    fn fput_object(&self, bucket: &str, key: &str, path: &Path, content_type: &str)
    -> CoreResult<()>;

    fn remove_object(&self, bucket: &str, key: &str) -> CoreResult<()>;

    fn stat_object(&self, bucket: &str, key: &str) -> CoreResult<ObjectStat>;

    /// Time-limited download URL for a renderer or external reader.
    fn presigned_get_object(&self, bucket: &str, key: &str, ttl: Duration) -> CoreResult<String>;

    /// Time-limited upload URL.
    fn presigned_put_object(&self, bucket: &str, key: &str, ttl: Duration) -> CoreResult<String>;

    /// Keys under a prefix, for cascading deletes.
    fn list_prefix(&self, bucket: &str, prefix: &str) -> CoreResult<Vec<String>>;

    /// Create the bucket if missing.
    fn ensure_bucket(&self, bucket: &str) -> CoreResult<()> {
        if !self.bucket_exists(bucket)? {
            self.make_bucket(bucket)?;
        }
        Ok(())
    }

    /// Best-effort removal of every object under a prefix. Errors on single
    /// objects are swallowed; a job deletion must not fail on leftovers.
    fn remove_prefix(&self, bucket: &str, prefix: &str) {
        if let Ok(keys) = self.list_prefix(bucket, prefix) {
            for key in keys {
                let _ = self.remove_object(bucket, &key);
            }
        }
    }
}

/// Filesystem-backed [`ObjectStore`]: one directory per bucket under `root`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        // Keys use '/' separators; map them onto the directory tree.
        let mut path = self.bucket_dir(bucket);
        for segment in key.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path.push(segment);
        }
        path
    }

    fn map_not_found(err: io::Error, what: String) -> CoreError {
        if err.kind() == io::ErrorKind::NotFound {
            CoreError::NotFound(what)
        } else {
            CoreError::Io(err)
        }
    }
}

impl ObjectStore for FsObjectStore {
    fn bucket_exists(&self, bucket: &str) -> CoreResult<bool> {
        Ok(self.bucket_dir(bucket).is_dir())
    }

    fn make_bucket(&self, bucket: &str) -> CoreResult<()> {
        fs::create_dir_all(self.bucket_dir(bucket))
            .map_err(|e| CoreError::StorageUnavailable(format!("make_bucket {bucket}: {e}")))
    }

    fn get_object(&self, bucket: &str, key: &str) -> CoreResult<Box<dyn Read + Send>> {
        let path = self.object_path(bucket, key);
        let file =
            File::open(&path).map_err(|e| Self::map_not_found(e, format!("{bucket}/{key}")))?;
        Ok(Box::new(file))
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &mut dyn Read,
        _length: u64,
        _content_type: &str,
    ) -> CoreResult<()> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CoreError::WriteError(format!("{bucket}/{key}: {e}")))?;
        }
        let mut file =
            File::create(&path).map_err(|e| CoreError::WriteError(format!("{bucket}/{key}: {e}")))?;
        io::copy(data, &mut file)
            .map_err(|e| CoreError::WriteError(format!("{bucket}/{key}: {e}")))?;
        file.flush()
            .map_err(|e| CoreError::WriteError(format!("{bucket}/{key}: {e}")))?;
        Ok(())
    }

    fn fput_object(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> CoreResult<()> {
        let mut file =
            File::open(path).map_err(|e| CoreError::ReadError(format!("{}: {e}", path.display())))?;
        let length = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.put_object(bucket, key, &mut file, length, content_type)
    }

    fn remove_object(&self, bucket: &str, key: &str) -> CoreResult<()> {
        let path = self.object_path(bucket, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::WriteError(format!("{bucket}/{key}: {e}"))),
        }
    }

    fn stat_object(&self, bucket: &str, key: &str) -> CoreResult<ObjectStat> {
        let path = self.object_path(bucket, key);
        let meta =
            fs::metadata(&path).map_err(|e| Self::map_not_found(e, format!("{bucket}/{key}")))?;
        Ok(ObjectStat {
            size: meta.len(),
            content_type: None,
        })
    }

    fn presigned_get_object(&self, bucket: &str, key: &str, ttl: Duration) -> CoreResult<String> {
        let path = self.object_path(bucket, key);
        if !path.is_file() {
            return Err(CoreError::NotFound(format!("{bucket}/{key}")));
        }
        Ok(format!(
            "file://{}?expires={}",
            path.display(),
            ttl.as_secs()
        ))
    }

    fn presigned_put_object(&self, bucket: &str, key: &str, ttl: Duration) -> CoreResult<String> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CoreError::WriteError(format!("{bucket}/{key}: {e}")))?;
        }
        Ok(format!(
            "file://{}?expires={}&method=put",
            path.display(),
            ttl.as_secs()
        ))
    }

    fn list_prefix(&self, bucket: &str, prefix: &str) -> CoreResult<Vec<String>> {
        let bucket_dir = self.bucket_dir(bucket);
        if !bucket_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut stack = vec![bucket_dir.clone()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).map_err(CoreError::Io)? {
                let entry = entry.map_err(CoreError::Io)?;
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&bucket_dir) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Object-key layout shared by the ingestion and visualization pipelines.
pub mod keys {
    use std::sync::LazyLock;

    use regex::Regex;

    static NON_WORD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s\-]").expect("static regex"));
    static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

    /// Folder-safe slug: strip punctuation, collapse whitespace to `_`.
    pub fn safe_slug(value: &str) -> String {
        let stripped = NON_WORD.replace_all(value.trim(), "");
        let joined = WHITESPACE.replace_all(&stripped, "_").replace("__", "_");
        if joined.is_empty() {
            "untitled".to_string()
        } else {
            joined
        }
    }

    /// Raw upload key under the project/dataset/tag layout.
    pub fn raw_key(
        project_slug: &str,
        dataset_folder: &str,
        tag: &str,
        file_id: &str,
        filename: &str,
    ) -> String {
        format!("{project_slug}/{dataset_folder}/{tag}/raw/{file_id}_{filename}")
    }

    /// Processed parquet artifact key next to the raw folder.
    pub fn processed_key(
        project_slug: &str,
        dataset_folder: &str,
        tag: &str,
        file_id: &str,
        stem: &str,
    ) -> String {
        format!("{project_slug}/{dataset_folder}/{tag}/processed/{file_id}_{stem}.parquet")
    }

    /// LOD tile key for one series and level.
    pub fn tile_key(project_id: &str, viz_id: &str, series_index: usize, level: usize) -> String {
        format!(
            "projects/{project_id}/visualizations/{viz_id}/series_{series_index}/level_{level}.parquet"
        )
    }

    /// Prefix owning every tile of a visualization.
    pub fn tiles_prefix(project_id: &str, viz_id: &str) -> String {
        format!("projects/{project_id}/visualizations/{viz_id}/")
    }

    /// Self-contained chart artifact key.
    pub fn chart_key(project_id: &str, viz_id: &str) -> String {
        format!("projects/{project_id}/visualizations/{viz_id}.html")
    }
}
