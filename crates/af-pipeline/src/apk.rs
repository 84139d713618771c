use af_core::ApkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a package's decompiled cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Decompiling,
    Ready,
    /// The upload is on disk but its cache is missing or was never built.
    Failed,
}

/// Metadata for one uploaded package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApkRecord {
    pub apk_id: ApkId,
    pub filename: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub cache_status: CacheStatus,
}

impl ApkRecord {
    /// A record for an upload whose cache is still being built.
    pub fn new(apk_id: ApkId, filename: impl Into<String>, size: u64) -> Self {
        Self {
            apk_id,
            filename: filename.into(),
            size,
            uploaded_at: Utc::now(),
            cache_status: CacheStatus::Decompiling,
        }
    }
}
