//! Application configuration types.
//!
//! The top-level [`Config`] struct carries the server, storage, tool and task
//! sections. Every section defaults sensibly so an empty file is valid; the
//! binary crate is responsible for reading and parsing the file itself.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub tasks: TaskConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            warnings.push("storage.data_dir is empty; the current directory will be used".into());
        }

        if let Some(ref path) = self.tools.apktool_path {
            if !path.exists() {
                warnings.push(format!(
                    "tools.apktool_path {} does not exist",
                    path.display()
                ));
            }
        }

        if self.tools.timeout_secs == 0 {
            warnings.push("tools.timeout_secs is 0; external tools will never time out".into());
        }

        if self.tasks.max_concurrent == 0 {
            warnings.push("tasks.max_concurrent is 0; task concurrency is unbounded".into());
        }

        if self.tasks.workspace_retention == WorkspaceRetention::Keep {
            warnings.push(
                "tasks.workspace_retention is 'keep'; workspaces accumulate until removed by hand"
                    .into(),
            );
        }

        if self.tasks.max_upload_mb == 0 {
            warnings.push("tasks.max_upload_mb is 0; every upload will be rejected".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Where uploads, caches, workspaces and artifacts live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// External tool paths and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Explicit apktool location; discovered on `PATH` when unset.
    pub apktool_path: Option<PathBuf>,
    /// Per-invocation timeout in seconds. Zero disables the timeout.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            apktool_path: None,
            timeout_secs: 600,
        }
    }
}

impl ToolsConfig {
    /// The configured timeout, or `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Task execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Maximum number of pipelines running at once. Zero means unbounded.
    pub max_concurrent: usize,
    /// What happens to a task workspace once its pipeline finishes.
    pub workspace_retention: WorkspaceRetention,
    /// Upload size limit in megabytes.
    pub max_upload_mb: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            workspace_retention: WorkspaceRetention::Delete,
            max_upload_mb: 500,
        }
    }
}

impl TaskConfig {
    /// Upload size limit in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

/// Policy for a task workspace after the pipeline finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceRetention {
    /// Remove the workspace once the artifact is built (or the task fails).
    #[default]
    Delete,
    /// Leave the workspace on disk after a successful build.
    Keep,
}
