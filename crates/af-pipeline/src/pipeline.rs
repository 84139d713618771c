//! The task pipeline: isolate, apply rules, recompile, publish or clean up.
//!
//! [`TaskPipeline::run`] owns a task's record from the moment it leaves
//! `Pending` until it reaches `Completed` or `Failed`. Every terminal
//! failure names the stage it came from in the task's `error` text.

use std::path::PathBuf;
use std::sync::Arc;

use af_apk::{discard, isolate, Recompiler};
use af_core::config::WorkspaceRetention;
use af_core::{ApkId, Error, TaskId};
use af_rules::{ReplacementRule, RuleResult};

use crate::layout::{remove_file, StorageLayout, DECOMPILED_DIR};
use crate::store::TaskStore;
use crate::task::TaskStatus;

const STEP_ISOLATE: &str = "isolate";
const STEP_APPLY: &str = "apply-rules";
const STEP_PREPARE_OUTPUT: &str = "prepare-output";
const STEP_RECOMPILE: &str = "recompile";

/// Drives one task from `Pending` to a terminal state.
pub struct TaskPipeline {
    store: Arc<dyn TaskStore>,
    layout: StorageLayout,
    recompiler: Arc<dyn Recompiler>,
    retention: WorkspaceRetention,
}

impl TaskPipeline {
    pub fn new(
        store: Arc<dyn TaskStore>,
        layout: StorageLayout,
        recompiler: Arc<dyn Recompiler>,
    ) -> Self {
        Self {
            store,
            layout,
            recompiler,
            retention: WorkspaceRetention::default(),
        }
    }

    pub fn with_retention(mut self, retention: WorkspaceRetention) -> Self {
        self.retention = retention;
        self
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Run a `Pending` task to completion.
    ///
    /// Tasks are single-shot: a missing task or one that has already left
    /// `Pending` is logged and left untouched. The outcome is observable
    /// only through the task store.
    pub async fn run(&self, task_id: TaskId, apk_id: ApkId, rules: Vec<ReplacementRule>) {
        let mut started = false;
        let claimed = self.store.update(task_id, &mut |task| {
            if task.status == TaskStatus::Pending {
                task.start();
                started = true;
            }
        });

        match claimed {
            None => {
                tracing::warn!(%task_id, "Task not found; nothing to run");
                return;
            }
            Some(task) if !started => {
                tracing::warn!(
                    %task_id,
                    status = task.status.as_str(),
                    "Task already started; refusing to run it again"
                );
                return;
            }
            Some(_) => {}
        }

        tracing::info!(%task_id, %apk_id, rules = rules.len(), "Task started");

        match self.execute(task_id, apk_id, rules).await {
            Ok((results, artifact)) => {
                let failed = results.iter().filter(|r| !r.success).count();
                tracing::info!(
                    %task_id,
                    applied = results.len() - failed,
                    failed,
                    artifact = %artifact.display(),
                    "Task completed"
                );
                self.store
                    .update(task_id, &mut |task| task.complete(results.clone(), artifact.clone()));
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(%task_id, "Task failed: {message}");
                self.store.update(task_id, &mut |task| task.fail(&message));
            }
        }
    }

    async fn execute(
        &self,
        task_id: TaskId,
        apk_id: ApkId,
        rules: Vec<ReplacementRule>,
    ) -> af_core::Result<(Vec<RuleResult>, PathBuf)> {
        let cache_dir = self.layout.cache_dir(apk_id);
        let work_dir = self.layout.work_dir(task_id);
        let output = self.layout.output_path(task_id);

        // The isolator removes whatever partial destination it created.
        isolate(&cache_dir, &work_dir)
            .await
            .map_err(|e| Error::pipeline(STEP_ISOLATE, e.to_string()))?;

        let tree = work_dir.join(DECOMPILED_DIR);

        let apply_root = tree.clone();
        let results = match tokio::task::spawn_blocking(move || {
            af_rules::apply_all(&apply_root, &rules)
        })
        .await
        {
            Ok(results) => results,
            Err(e) => {
                discard(&work_dir).await;
                return Err(Error::pipeline(STEP_APPLY, e.to_string()));
            }
        };

        if let Err(e) = prepare_output(&output).await {
            discard(&work_dir).await;
            return Err(Error::pipeline(STEP_PREPARE_OUTPUT, e.to_string()));
        }

        let rebuilt = match self.recompiler.recompile(&tree, &output).await {
            Ok(()) if output.is_file() => Ok(()),
            Ok(()) => Err(format!(
                "recompiler reported success but wrote no artifact at {}",
                output.display()
            )),
            Err(e) => Err(e.to_string()),
        };
        if let Err(message) = rebuilt {
            if let Err(e) = remove_file(&output).await {
                tracing::warn!(%task_id, "Failed to remove partial artifact: {e}");
            }
            discard(&work_dir).await;
            return Err(Error::pipeline(STEP_RECOMPILE, message));
        }

        match self.retention {
            WorkspaceRetention::Delete => discard(&work_dir).await,
            WorkspaceRetention::Keep => {
                tracing::debug!(%task_id, path = %work_dir.display(), "Keeping workspace")
            }
        }

        Ok((results, output))
    }
}

/// Create the artifact's parent directory and clear any stale artifact.
async fn prepare_output(output: &std::path::Path) -> std::io::Result<()> {
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    remove_file(output).await
}
