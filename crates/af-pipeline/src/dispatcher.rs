//! Task acceptance and background scheduling.
//!
//! [`TaskDispatcher::submit`] checks a request, records a `Pending` task and
//! hands it to a spawned tokio task without waiting for it. When a
//! concurrency limit is configured, tasks stay `Pending` until a permit is
//! free.
//!
//! Accepting a task and deleting its package are serialized: a package that
//! is being deleted accepts no new tasks, and a deletion never starts while
//! a task for the package is pending or running.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use af_core::{ApkId, Error, TaskId};
use af_rules::{ReplacementRule, ValidationError, ValidationResult};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::apk::CacheStatus;
use crate::layout::StorageLayout;
use crate::pipeline::TaskPipeline;
use crate::store::{ApkStore, TaskStore};
use crate::task::Task;

/// Why a task could not be created.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("APK {0} not found")]
    ApkNotFound(ApkId),

    #[error("cache for APK {0} is not ready")]
    CacheNotReady(ApkId),

    #[error("rule set failed validation with {} error(s)", .0.len())]
    InvalidRules(Vec<ValidationError>),
}

pub struct TaskDispatcher {
    pipeline: Arc<TaskPipeline>,
    apks: Arc<dyn ApkStore>,
    permits: Option<Arc<Semaphore>>,
    /// Packages whose files are being removed. Guarded together with the
    /// task-store checks in `accept` and `delete_apk`.
    deleting: Mutex<HashSet<ApkId>>,
}

impl TaskDispatcher {
    /// `max_concurrent == 0` runs every accepted task immediately.
    pub fn new(pipeline: TaskPipeline, apks: Arc<dyn ApkStore>, max_concurrent: usize) -> Self {
        let permits = (max_concurrent > 0).then(|| Arc::new(Semaphore::new(max_concurrent)));
        Self {
            pipeline: Arc::new(pipeline),
            apks,
            permits,
            deleting: Mutex::new(HashSet::new()),
        }
    }

    fn store(&self) -> &Arc<dyn TaskStore> {
        self.pipeline.store()
    }

    pub fn layout(&self) -> &StorageLayout {
        self.pipeline.layout()
    }

    pub fn validate(&self, rules: &[ReplacementRule]) -> ValidationResult {
        af_rules::validate(rules)
    }

    /// Accept a rule batch for `apk_id` and start it in the background.
    ///
    /// Must be called from within a tokio runtime. Returns the new task in
    /// its `Pending` state.
    pub fn submit(&self, apk_id: ApkId, rules: Vec<ReplacementRule>) -> Result<Task, SubmitError> {
        self.accept(apk_id, rules).map(|(task, _handle)| task)
    }

    /// Submit and wait for the task to reach a terminal state.
    pub async fn run_to_completion(
        &self,
        apk_id: ApkId,
        rules: Vec<ReplacementRule>,
    ) -> Result<Task, SubmitError> {
        let (task, handle) = self.accept(apk_id, rules)?;
        if let Err(e) = handle.await {
            tracing::error!(task_id = %task.task_id, "Pipeline task aborted: {e}");
        }
        Ok(self.store().get(task.task_id).unwrap_or(task))
    }

    fn accept(
        &self,
        apk_id: ApkId,
        rules: Vec<ReplacementRule>,
    ) -> Result<(Task, JoinHandle<()>), SubmitError> {
        let validation = self.validate(&rules);
        if !validation.valid {
            return Err(SubmitError::InvalidRules(validation.errors));
        }

        let task = {
            let deleting = self.deleting.lock();
            let layout = self.layout();
            if deleting.contains(&apk_id) || !layout.apk_exists(apk_id) {
                return Err(SubmitError::ApkNotFound(apk_id));
            }
            if !layout.cache_ready(apk_id) {
                return Err(SubmitError::CacheNotReady(apk_id));
            }

            let task = Task::new(apk_id);
            self.store().put(task.clone());
            task
        };
        let task_id = task.task_id;
        tracing::info!(%task_id, %apk_id, rules = rules.len(), "Task accepted");

        let pipeline = Arc::clone(&self.pipeline);
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            pipeline.run(task_id, apk_id, rules).await;
        });

        Ok((task, handle))
    }

    pub fn task(&self, task_id: TaskId) -> Option<Task> {
        self.store().get(task_id)
    }

    /// All tasks, newest first.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks = self.store().list();
        tasks.reverse();
        tasks
    }

    /// Path of a task's rebuilt package.
    ///
    /// Ready only when the task is `Completed` and the file exists.
    pub fn artifact(&self, task_id: TaskId) -> af_core::Result<PathBuf> {
        let task = self
            .store()
            .get(task_id)
            .ok_or_else(|| Error::not_found("task", task_id))?;

        let downloadable = task.is_downloadable();
        match task.artifact {
            Some(path) if downloadable && path.is_file() => Ok(path),
            _ => Err(Error::artifact_missing(task_id)),
        }
    }

    /// Remove an uploaded package, its cache, and all of its tasks.
    ///
    /// Refused while the package is still being decompiled or any of its
    /// tasks is pending or running. Tasks submitted once deletion has begun
    /// are rejected as if the package were already gone.
    pub async fn delete_apk(&self, apk_id: ApkId) -> af_core::Result<()> {
        let task_ids = self.begin_delete(apk_id)?;

        let result = self.layout().delete_apk(apk_id, &task_ids).await;
        if result.is_ok() {
            for task_id in task_ids {
                self.store().delete(task_id);
            }
            self.apks.delete(apk_id);
            tracing::info!(%apk_id, "Package deleted");
        }

        self.deleting.lock().remove(&apk_id);
        result
    }

    /// Check that `apk_id` may be deleted and mark it as being deleted.
    /// Returns the ids of its (all terminal) tasks.
    fn begin_delete(&self, apk_id: ApkId) -> af_core::Result<Vec<TaskId>> {
        let mut deleting = self.deleting.lock();
        if deleting.contains(&apk_id) {
            return Err(Error::Conflict(format!(
                "APK {apk_id} is already being deleted"
            )));
        }

        let layout = self.layout();
        if !layout.apk_exists(apk_id) && !layout.cache_dir(apk_id).exists() {
            return Err(Error::not_found("apk", apk_id));
        }
        if self
            .apks
            .get(apk_id)
            .is_some_and(|r| r.cache_status == CacheStatus::Decompiling)
        {
            return Err(Error::Conflict(format!(
                "APK {apk_id} is still being decompiled"
            )));
        }

        let tasks = self.store().list_for_apk(apk_id);
        if tasks.iter().any(|t| !t.is_terminal()) {
            return Err(Error::Conflict(format!(
                "APK {apk_id} has tasks that are still running"
            )));
        }

        deleting.insert(apk_id);
        Ok(tasks.iter().map(|t| t.task_id).collect())
    }
}
