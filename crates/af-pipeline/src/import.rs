//! Package upload: store the file and build its decompiled cache once.

use std::io::Cursor;
use std::sync::Arc;

use af_apk::Decompiler;
use af_core::ApkId;

use crate::apk::{ApkRecord, CacheStatus};
use crate::layout::{StorageLayout, DECOMPILED_DIR};
use crate::store::ApkStore;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// Why an upload was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("file is {size} bytes; the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("not an APK: {0}")]
    NotAnApk(String),

    #[error("decompile failed: {0}")]
    Decompile(#[source] af_core::Error),

    #[error("storage error: {0}")]
    Storage(#[source] af_core::Error),
}

impl From<std::io::Error> for ImportError {
    fn from(e: std::io::Error) -> Self {
        ImportError::Storage(e.into())
    }
}

pub struct ApkImporter {
    layout: StorageLayout,
    apks: Arc<dyn ApkStore>,
    decompiler: Arc<dyn Decompiler>,
    max_bytes: u64,
}

impl ApkImporter {
    pub fn new(
        layout: StorageLayout,
        apks: Arc<dyn ApkStore>,
        decompiler: Arc<dyn Decompiler>,
        max_bytes: u64,
    ) -> Self {
        Self {
            layout,
            apks,
            decompiler,
            max_bytes,
        }
    }

    /// Store `bytes` as a new package and decompile it into the cache.
    ///
    /// The package is listed as `decompiling` while the cache is built. The
    /// cache tree is decompiled into a staging directory and renamed into
    /// place only on success. On failure nothing of the upload is left
    /// behind, record included.
    pub async fn import(&self, bytes: &[u8], filename: &str) -> Result<ApkRecord, ImportError> {
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(ImportError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        check_apk_format(bytes)?;

        let apk_id = ApkId::new();
        let mut record = ApkRecord::new(apk_id, display_name(filename, apk_id), size);
        self.apks.put(record.clone());

        if let Err(e) = self.store_and_decompile(apk_id, bytes).await {
            tracing::error!(%apk_id, "Import failed: {e}");
            self.apks.delete(apk_id);
            if let Err(cleanup) = self.layout.delete_apk(apk_id, &[]).await {
                tracing::warn!(%apk_id, "Failed to clean up rejected upload: {cleanup}");
            }
            return Err(e);
        }

        record.cache_status = CacheStatus::Ready;
        self.apks.put(record.clone());
        tracing::info!(
            %apk_id,
            cache = %self.layout.cache_dir(apk_id).display(),
            "Cache ready"
        );

        Ok(record)
    }

    async fn store_and_decompile(&self, apk_id: ApkId, bytes: &[u8]) -> Result<(), ImportError> {
        let apk_path = self.layout.apk_path(apk_id);
        let staging = self.layout.staging_dir(apk_id);
        let cache_dir = self.layout.cache_dir(apk_id);

        tokio::fs::create_dir_all(self.layout.uploads_dir()).await?;
        tokio::fs::create_dir_all(self.layout.cache_root()).await?;
        tokio::fs::write(&apk_path, bytes).await?;
        tracing::info!(%apk_id, size = bytes.len(), "Package stored; decompiling");

        self.decompiler
            .decompile(&apk_path, &staging)
            .await
            .map_err(ImportError::Decompile)?;

        tokio::fs::create_dir_all(&cache_dir).await?;
        tokio::fs::rename(&staging, cache_dir.join(DECOMPILED_DIR)).await?;
        Ok(())
    }
}

/// A package is a ZIP archive carrying an `AndroidManifest.xml` entry.
fn check_apk_format(bytes: &[u8]) -> Result<(), ImportError> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(ImportError::NotAnApk(
            "missing ZIP signature (PK\\x03\\x04)".into(),
        ));
    }

    let archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ImportError::NotAnApk(format!("unreadable ZIP archive: {e}")))?;
    if !archive.file_names().any(|name| name == MANIFEST_ENTRY) {
        return Err(ImportError::NotAnApk(format!(
            "{MANIFEST_ENTRY} missing from archive"
        )));
    }
    Ok(())
}

fn display_name(filename: &str, apk_id: ApkId) -> String {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        format!("{apk_id}.apk")
    } else {
        trimmed.to_string()
    }
}
