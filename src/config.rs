//! Process configuration.
//!
//! All knobs are read once from the environment at startup via
//! [`Settings::from_env`] and cloned into the components that need them.
//! Defaults mirror a local single-node deployment.

use std::env;

/// Configuration for the stores, the cache, the database and the worker pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Object-store endpoint (host:port).
    pub object_store_endpoint: String,
    /// Object-store access key.
    pub object_store_access_key: String,
    /// Object-store secret key.
    pub object_store_secret_key: String,
    /// Bucket holding raw uploads and processed parquet artifacts.
    pub ingestion_bucket: String,
    /// Bucket holding chart artifacts and LOD tiles.
    pub visualization_bucket: String,
    /// Key-value cache / broker URL (status hashes + progress pub/sub).
    pub cache_url: String,
    /// Document database URI.
    pub mongo_uri: String,
    /// Document database name.
    pub mongo_db: String,
    /// Shared secret for bearer tokens minted by the outer API.
    pub jwt_secret: String,
    /// JWT signing algorithm name.
    pub jwt_algorithm: String,
    /// Root directory for the filesystem-backed object store.
    pub data_root: String,
    /// Optional worker-count override; `None` derives bounds from the host.
    pub workers: Option<usize>,
    /// Compile-time default API base embedded into chart artifacts.
    pub api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            object_store_endpoint: "127.0.0.1:9000".to_string(),
            object_store_access_key: "minioadmin".to_string(),
            object_store_secret_key: "minioadmin".to_string(),
            ingestion_bucket: "ingestion".to_string(),
            visualization_bucket: "visualizations".to_string(),
            cache_url: "redis://127.0.0.1:6379".to_string(),
            mongo_uri: "mongodb://127.0.0.1:27017".to_string(),
            mongo_db: "flightdv".to_string(),
            jwt_secret: "change-me".to_string(),
            jwt_algorithm: "HS256".to_string(),
            data_root: "./data".to_string(),
            workers: None,
            api_base: "http://localhost:8000".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from `FD_*` environment variables, falling back to
    /// [`Settings::default`] per field.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            object_store_endpoint: var_or("FD_OBJECT_STORE_ENDPOINT", d.object_store_endpoint),
            object_store_access_key: var_or("FD_OBJECT_STORE_ACCESS_KEY", d.object_store_access_key),
            object_store_secret_key: var_or("FD_OBJECT_STORE_SECRET_KEY", d.object_store_secret_key),
            ingestion_bucket: var_or("FD_INGESTION_BUCKET", d.ingestion_bucket),
            visualization_bucket: var_or("FD_VISUALIZATION_BUCKET", d.visualization_bucket),
            cache_url: var_or("FD_CACHE_URL", d.cache_url),
            mongo_uri: var_or("FD_MONGO_URI", d.mongo_uri),
            mongo_db: var_or("FD_MONGO_DB", d.mongo_db),
            jwt_secret: var_or("FD_JWT_SECRET", d.jwt_secret),
            jwt_algorithm: var_or("FD_JWT_ALGORITHM", d.jwt_algorithm),
            data_root: var_or("FD_DATA_ROOT", d.data_root),
            workers: env::var("FD_WORKERS").ok().and_then(|v| v.trim().parse().ok()),
            api_base: var_or("FD_API_BASE", d.api_base),
        }
    }
}

/// Install the process-wide tracing subscriber, filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn var_or(name: &str, default: String) -> String {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    fn defaults_are_local_single_node() {
        let s = Settings::default();
        assert_eq!(s.mongo_db, "flightdv");
        assert_eq!(s.ingestion_bucket, "ingestion");
        assert_eq!(s.jwt_algorithm, "HS256");
        assert!(s.workers.is_none());
    }
}
