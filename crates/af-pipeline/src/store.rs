//! Task and package record storage.
//!
//! The pipeline, dispatcher and importer only see the [`TaskStore`] and
//! [`ApkStore`] traits; the backings are injected as `Arc<dyn ..>`. Readers
//! always receive cloned snapshots, never references into a store.

use std::collections::HashMap;

use af_core::{ApkId, TaskId};
use parking_lot::RwLock;

use crate::apk::ApkRecord;
use crate::task::Task;

/// Keyed storage for task records.
pub trait TaskStore: Send + Sync {
    /// Snapshot of one task.
    fn get(&self, task_id: TaskId) -> Option<Task>;

    /// Insert or replace a task.
    fn put(&self, task: Task);

    /// Remove a task, returning its last state.
    fn delete(&self, task_id: TaskId) -> Option<Task>;

    /// Snapshots of every task, oldest first.
    fn list(&self) -> Vec<Task>;

    /// Mutate one task atomically with respect to other writers and return
    /// the updated snapshot. `None` if the task does not exist.
    fn update(&self, task_id: TaskId, apply: &mut dyn FnMut(&mut Task)) -> Option<Task>;

    /// Snapshots of the tasks belonging to one package, oldest first.
    fn list_for_apk(&self, apk_id: ApkId) -> Vec<Task> {
        self.list()
            .into_iter()
            .filter(|t| t.apk_id == apk_id)
            .collect()
    }
}

/// Process-local task store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn get(&self, task_id: TaskId) -> Option<Task> {
        self.tasks.read().get(&task_id).cloned()
    }

    fn put(&self, task: Task) {
        self.tasks.write().insert(task.task_id, task);
    }

    fn delete(&self, task_id: TaskId) -> Option<Task> {
        self.tasks.write().remove(&task_id)
    }

    fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    fn update(&self, task_id: TaskId, apply: &mut dyn FnMut(&mut Task)) -> Option<Task> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(&task_id)?;
        apply(task);
        Some(task.clone())
    }
}

/// Keyed storage for upload metadata.
///
/// Holds what the filesystem cannot tell: the client's filename, the upload
/// time, and whether a decompile is still running.
pub trait ApkStore: Send + Sync {
    fn get(&self, apk_id: ApkId) -> Option<ApkRecord>;

    /// Insert or replace a record.
    fn put(&self, record: ApkRecord);

    fn delete(&self, apk_id: ApkId) -> Option<ApkRecord>;

    /// Snapshots of every record, oldest upload first.
    fn list(&self) -> Vec<ApkRecord>;
}

/// Process-local package metadata. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryApkStore {
    apks: RwLock<HashMap<ApkId, ApkRecord>>,
}

impl InMemoryApkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApkStore for InMemoryApkStore {
    fn get(&self, apk_id: ApkId) -> Option<ApkRecord> {
        self.apks.read().get(&apk_id).cloned()
    }

    fn put(&self, record: ApkRecord) {
        self.apks.write().insert(record.apk_id, record);
    }

    fn delete(&self, apk_id: ApkId) -> Option<ApkRecord> {
        self.apks.write().remove(&apk_id)
    }

    fn list(&self) -> Vec<ApkRecord> {
        let mut apks: Vec<ApkRecord> = self.apks.read().values().cloned().collect();
        apks.sort_by_key(|a| a.uploaded_at);
        apks
    }
}
