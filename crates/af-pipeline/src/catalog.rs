//! Read-only views of uploaded packages: listing, their tasks, and the
//! contents of their decompiled caches.
//!
//! Upload metadata comes from the [`ApkStore`] when it has a record and from
//! the filesystem otherwise, so packages uploaded before a restart are still
//! listed and browsable.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use af_core::ApkId;
use af_rules::is_safe_target_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::apk::{ApkRecord, CacheStatus};
use crate::layout::{StorageLayout, DECOMPILED_DIR};
use crate::store::{ApkStore, TaskStore};
use crate::task::Task;

/// Why a package or one of its files could not be read.
#[derive(Debug, thiserror::Error)]
pub enum BrowseError {
    #[error("APK {0} not found")]
    ApkNotFound(ApkId),

    #[error("cache for APK {0} is not ready")]
    CacheNotReady(ApkId),

    #[error("path rejected: {0}")]
    UnsafePath(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file is not UTF-8 text: {0}")]
    NotText(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry of a decompiled tree. Paths are relative to the tree root and
/// use `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    #[serde(default)]
    pub children: Vec<FileNode>,
    pub size: Option<u64>,
}

/// A package plus the number of tasks recorded against it.
#[derive(Debug, Clone, Serialize)]
pub struct ApkSummary {
    #[serde(flatten)]
    pub record: ApkRecord,
    pub task_count: usize,
}

pub struct ApkCatalog {
    layout: StorageLayout,
    apks: Arc<dyn ApkStore>,
    tasks: Arc<dyn TaskStore>,
}

impl ApkCatalog {
    pub fn new(layout: StorageLayout, apks: Arc<dyn ApkStore>, tasks: Arc<dyn TaskStore>) -> Self {
        Self {
            layout,
            apks,
            tasks,
        }
    }

    /// Every package on disk or mid-import, newest upload first.
    pub fn list(&self) -> Result<Vec<ApkSummary>, BrowseError> {
        let mut ids = self.layout.uploaded_ids()?;
        for record in self.apks.list() {
            if !ids.contains(&record.apk_id) {
                ids.push(record.apk_id);
            }
        }

        let tasks = self.tasks.list();
        let mut summaries: Vec<ApkSummary> = ids
            .into_iter()
            .filter_map(|apk_id| self.get(apk_id))
            .map(|record| {
                let task_count = tasks.iter().filter(|t| t.apk_id == record.apk_id).count();
                ApkSummary { record, task_count }
            })
            .collect();
        summaries.sort_by(|a, b| b.record.uploaded_at.cmp(&a.record.uploaded_at));
        Ok(summaries)
    }

    /// Metadata for one package, or `None` if it was never uploaded.
    pub fn get(&self, apk_id: ApkId) -> Option<ApkRecord> {
        if let Some(record) = self.apks.get(apk_id) {
            return Some(record);
        }

        // Uploaded by an earlier process: reconstruct from the filesystem.
        let metadata = std::fs::metadata(self.layout.apk_path(apk_id)).ok()?;
        let uploaded_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let cache_status = if self.layout.cache_ready(apk_id) {
            CacheStatus::Ready
        } else {
            CacheStatus::Failed
        };

        Some(ApkRecord {
            apk_id,
            filename: format!("{apk_id}.apk"),
            size: metadata.len(),
            uploaded_at,
            cache_status,
        })
    }

    /// Tasks run against one package, newest first.
    pub fn tasks(&self, apk_id: ApkId) -> Result<Vec<Task>, BrowseError> {
        self.get(apk_id).ok_or(BrowseError::ApkNotFound(apk_id))?;
        let mut tasks = self.tasks.list_for_apk(apk_id);
        tasks.reverse();
        Ok(tasks)
    }

    /// The decompiled tree of a package: directories first, then files,
    /// each group ordered by case-insensitive name.
    pub async fn files(&self, apk_id: ApkId) -> Result<Vec<FileNode>, BrowseError> {
        let root = self.ready_tree(apk_id)?;
        tokio::task::spawn_blocking(move || build_tree(&root))
            .await
            .map_err(|e| BrowseError::Io(std::io::Error::other(e)))
    }

    /// Text content of one file in a package's decompiled tree.
    ///
    /// `internal_path` must be relative and free of `..`; after symlinks are
    /// resolved the file must still lie inside the tree.
    pub async fn read_file(&self, apk_id: ApkId, internal_path: &str) -> Result<String, BrowseError> {
        let root = self.ready_tree(apk_id)?;
        if !is_safe_target_path(internal_path) {
            return Err(BrowseError::UnsafePath(internal_path.to_string()));
        }

        let root = tokio::fs::canonicalize(&root).await?;
        let target = match tokio::fs::canonicalize(root.join(internal_path)).await {
            Ok(target) => target,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BrowseError::FileNotFound(internal_path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !target.starts_with(&root) {
            return Err(BrowseError::UnsafePath(internal_path.to_string()));
        }
        if !target.is_file() {
            return Err(BrowseError::FileNotFound(internal_path.to_string()));
        }

        let bytes = tokio::fs::read(&target).await?;
        String::from_utf8(bytes).map_err(|_| BrowseError::NotText(internal_path.to_string()))
    }

    fn ready_tree(&self, apk_id: ApkId) -> Result<std::path::PathBuf, BrowseError> {
        let record = self.get(apk_id).ok_or(BrowseError::ApkNotFound(apk_id))?;
        if record.cache_status != CacheStatus::Ready || !self.layout.cache_ready(apk_id) {
            return Err(BrowseError::CacheNotReady(apk_id));
        }
        Ok(self.layout.cache_dir(apk_id).join(DECOMPILED_DIR))
    }
}

fn directories_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    let key = |e: &DirEntry| (!e.file_type().is_dir(), e.file_name().to_ascii_lowercase());
    key(a).cmp(&key(b))
}

/// Fold a depth-first walk into nested nodes. Unreadable entries are
/// skipped.
fn build_tree(root: &Path) -> Vec<FileNode> {
    let mut roots = Vec::new();
    // open[i] is the directory currently being filled at depth i + 1.
    let mut open: Vec<FileNode> = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by(directories_first);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), "Skipping unreadable entry: {e}");
                continue;
            }
        };

        while open.len() >= entry.depth() {
            close_directory(&mut open, &mut roots);
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let path = relative_path(root, entry.path());
        if entry.file_type().is_dir() {
            open.push(FileNode {
                name,
                path,
                is_directory: true,
                children: Vec::new(),
                size: None,
            });
        } else {
            let size = entry.metadata().map(|m| m.len()).ok();
            attach(
                &mut open,
                &mut roots,
                FileNode {
                    name,
                    path,
                    is_directory: false,
                    children: Vec::new(),
                    size,
                },
            );
        }
    }

    while !open.is_empty() {
        close_directory(&mut open, &mut roots);
    }
    roots
}

fn close_directory(open: &mut Vec<FileNode>, roots: &mut Vec<FileNode>) {
    if let Some(dir) = open.pop() {
        attach(open, roots, dir);
    }
}

fn attach(open: &mut [FileNode], roots: &mut Vec<FileNode>, node: FileNode) {
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
