//! apktool integration: decompiling uploads and rebuilding task workspaces.
//!
//! The pipeline only sees the [`Recompiler`] and [`Decompiler`] traits, so
//! tests can substitute in-process fakes for the real tool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use af_core::config::ToolsConfig;
use af_core::Error;
use async_trait::async_trait;

use crate::command::ToolCommand;

/// Tools reported by [`check_tools`].
const KNOWN_TOOLS: &[&str] = &["apktool", "java"];

/// Rebuilds a decompiled tree into a package file.
#[async_trait]
pub trait Recompiler: Send + Sync {
    /// Build `source_dir` into `output`. On failure the error message must
    /// carry the tool's exit status and captured diagnostics.
    async fn recompile(&self, source_dir: &Path, output: &Path) -> af_core::Result<()>;
}

/// Expands a package file into a decompiled tree.
#[async_trait]
pub trait Decompiler: Send + Sync {
    /// Decompile `apk` into `output_dir`, replacing anything already there.
    async fn decompile(&self, apk: &Path, output_dir: &Path) -> af_core::Result<()>;
}

/// The apktool command-line tool.
#[derive(Debug, Clone)]
pub struct ApkTool {
    path: PathBuf,
    timeout: Option<Duration>,
}

impl ApkTool {
    /// Use the apktool executable at `path`.
    pub fn new(path: PathBuf, timeout: Option<Duration>) -> Self {
        Self { path, timeout }
    }

    /// Locate apktool from config, falling back to `PATH`.
    ///
    /// A configured path that does not exist is ignored in favour of the
    /// `PATH` lookup.
    pub fn discover(config: &ToolsConfig) -> af_core::Result<Self> {
        let path = resolve("apktool", config.apktool_path.as_deref()).ok_or_else(|| {
            Error::tool("apktool", "apktool not found; is it installed and in PATH?")
        })?;
        tracing::debug!(path = %path.display(), "Using apktool");
        Ok(Self::new(path, config.timeout()))
    }

    /// Path of the executable in use.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn command(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.path.clone());
        cmd.timeout(self.timeout);
        cmd
    }
}

#[async_trait]
impl Recompiler for ApkTool {
    async fn recompile(&self, source_dir: &Path, output: &Path) -> af_core::Result<()> {
        tracing::info!(
            source = %source_dir.display(),
            output = %output.display(),
            "Rebuilding package"
        );
        self.command()
            .arg("b")
            .arg(source_dir)
            .arg("-o")
            .arg(output)
            .execute()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Decompiler for ApkTool {
    async fn decompile(&self, apk: &Path, output_dir: &Path) -> af_core::Result<()> {
        tracing::info!(
            apk = %apk.display(),
            output = %output_dir.display(),
            "Decompiling package"
        );
        self.command()
            .arg("d")
            .arg(apk)
            .arg("-o")
            .arg(output_dir)
            .arg("-f")
            .execute()
            .await?;
        Ok(())
    }
}

/// Availability information for a tool, returned by [`check_tools`].
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first non-empty output line), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Report availability of apktool and the Java runtime it needs.
pub fn check_tools(config: &ToolsConfig) -> Vec<ToolInfo> {
    KNOWN_TOOLS
        .iter()
        .map(|&name| {
            let custom = match name {
                "apktool" => config.apktool_path.as_deref(),
                _ => None,
            };
            match resolve(name, custom) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(name, &path),
                    path: Some(path),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            }
        })
        .collect()
}

fn resolve(name: &str, custom_path: Option<&Path>) -> Option<PathBuf> {
    match custom_path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        _ => which::which(name).ok(),
    }
}

/// Run the tool's version flag and return the first non-empty line.
///
/// `java -version` writes to stderr, so both streams are checked.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let version_arg = match name {
        "java" => "-version",
        _ => "--version",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
