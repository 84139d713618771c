//! On-disk layout of uploads, caches, workspaces and artifacts.
//!
//! ```text
//! {data_dir}/
//!   uploads/{apk_id}.apk
//!   cache/{apk_id}/decompiled/      ready cache tree
//!   cache/{apk_id}.partial/         decompile in progress
//!   workspace/{task_id}/decompiled/
//!   output/{task_id}.apk
//! ```
//!
//! Path functions are pure. Creating and removing what they point at is the
//! caller's job.

use std::io;
use std::path::{Path, PathBuf};

use af_core::{ApkId, TaskId};

/// Name of the decompiled tree inside a cache or workspace directory.
pub const DECOMPILED_DIR: &str = "decompiled";

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.root.join("workspace")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn apk_path(&self, apk_id: ApkId) -> PathBuf {
        self.uploads_dir().join(format!("{apk_id}.apk"))
    }

    pub fn cache_dir(&self, apk_id: ApkId) -> PathBuf {
        self.cache_root().join(apk_id.to_string())
    }

    /// Where a decompile is written before being renamed into the cache.
    pub fn staging_dir(&self, apk_id: ApkId) -> PathBuf {
        self.cache_root().join(format!("{apk_id}.partial"))
    }

    pub fn work_dir(&self, task_id: TaskId) -> PathBuf {
        self.workspace_root().join(task_id.to_string())
    }

    pub fn output_path(&self, task_id: TaskId) -> PathBuf {
        self.output_dir().join(format!("{task_id}.apk"))
    }

    /// Create the four storage roots.
    pub fn ensure_directories(&self) -> af_core::Result<()> {
        for dir in [
            self.uploads_dir(),
            self.cache_root(),
            self.workspace_root(),
            self.output_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Whether a package with this id was uploaded.
    pub fn apk_exists(&self, apk_id: ApkId) -> bool {
        self.apk_path(apk_id).is_file()
    }

    /// Ids of every package under `uploads/`, in no particular order.
    ///
    /// Files whose stem is not an id are ignored.
    pub fn uploaded_ids(&self) -> io::Result<Vec<ApkId>> {
        let entries = match std::fs::read_dir(self.uploads_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "apk") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse().ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Whether the decompiled cache tree is complete and usable.
    ///
    /// The tree only appears under `cache/{apk_id}/decompiled` once its
    /// decompile has finished, so existence implies completeness.
    pub fn cache_ready(&self, apk_id: ApkId) -> bool {
        self.cache_dir(apk_id).join(DECOMPILED_DIR).is_dir()
    }

    /// Remove a package's upload, cache and staging tree, plus the outputs
    /// and workspaces of `task_ids`. Entries that are already gone are
    /// skipped.
    pub async fn delete_apk(&self, apk_id: ApkId, task_ids: &[TaskId]) -> af_core::Result<()> {
        remove_file(&self.apk_path(apk_id)).await?;
        remove_dir(&self.cache_dir(apk_id)).await?;
        remove_dir(&self.staging_dir(apk_id)).await?;

        for &task_id in task_ids {
            remove_file(&self.output_path(task_id)).await?;
            remove_dir(&self.work_dir(task_id)).await?;
        }

        tracing::info!(%apk_id, tasks = task_ids.len(), "Package storage removed");
        Ok(())
    }
}

pub(crate) async fn remove_file(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

async fn remove_dir(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
