use af_core::{ApkId, TaskId};
use af_rules::RuleResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One rule-application run against one uploaded package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub apk_id: ApkId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rule_results: Vec<RuleResult>,
    pub error: Option<String>,
    /// Location of the rebuilt package; never exposed over the API.
    #[serde(skip)]
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl Task {
    pub fn new(apk_id: ApkId) -> Self {
        Self {
            task_id: TaskId::new(),
            apk_id,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            rule_results: Vec::new(),
            error: None,
            artifact: None,
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, rule_results: Vec<RuleResult>, artifact: PathBuf) {
        self.status = TaskStatus::Completed;
        self.rule_results = rule_results;
        self.artifact = Some(artifact);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.to_string());
        self.artifact = None;
        self.completed_at = Some(Utc::now());
    }

    /// `Completed` or `Failed`; no further transitions occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Completed with a recorded artifact. The caller still has to check
    /// that the file exists.
    pub fn is_downloadable(&self) -> bool {
        self.status == TaskStatus::Completed && self.artifact.is_some()
    }
}
