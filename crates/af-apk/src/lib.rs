//! # af-apk
//!
//! External tool management and workspace isolation for apkforge.
//!
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **apktool** ([`ApkTool`]) -- implements [`Recompiler`] and
//!   [`Decompiler`] by shelling out to `apktool b` / `apktool d`.
//! - **Workspaces** ([`isolate`], [`discard`]) -- private per-task copies
//!   of a cached decompiled tree.

pub mod apktool;
pub mod command;
pub mod workspace;

pub use apktool::{check_tools, ApkTool, Decompiler, Recompiler, ToolInfo};
pub use command::{ToolCommand, ToolOutput};
pub use workspace::{discard, isolate};
