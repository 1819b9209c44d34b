//! External-state gateways: object storage, job documents, progress fan-out.
//!
//! Each gateway is a trait at the seam plus one shipped implementation usable
//! without infrastructure (filesystem buckets, in-memory documents, in-process
//! pub/sub). A deployment backs the same traits with MinIO/S3, MongoDB and
//! Redis; the pipelines only see the traits.

pub mod jobs;
pub mod object;
pub mod progress;

pub use jobs::{JobStore, MemoryJobStore};
pub use object::{FsObjectStore, ObjectStat, ObjectStore, keys};
pub use progress::{ProgressChannel, StatusSnapshot};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix timestamp in seconds.
pub fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
