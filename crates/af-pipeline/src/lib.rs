//! # af-pipeline
//!
//! Task lifecycle and orchestration for apkforge.
//!
//! - [`Task`] / [`TaskStatus`] -- the per-task record and its state machine
//!   (`pending -> processing -> completed | failed`).
//! - [`TaskStore`] / [`ApkStore`] -- injected storage for task and package
//!   records, with in-memory backings as the default.
//! - [`StorageLayout`] -- deterministic on-disk paths for uploads, caches,
//!   workspaces and artifacts.
//! - [`TaskPipeline`] -- isolate, apply rules, recompile, clean up.
//! - [`TaskDispatcher`] -- validates requests and schedules pipelines in the
//!   background, optionally behind a concurrency limit.
//! - [`ApkImporter`] -- stores uploads and builds their decompiled cache.
//! - [`ApkCatalog`] -- package listing and read-only browsing of caches.

pub mod apk;
pub mod catalog;
pub mod dispatcher;
pub mod import;
pub mod layout;
pub mod pipeline;
pub mod store;
pub mod task;

pub use apk::{ApkRecord, CacheStatus};
pub use catalog::{ApkCatalog, ApkSummary, BrowseError, FileNode};
pub use dispatcher::{SubmitError, TaskDispatcher};
pub use import::{ApkImporter, ImportError};
pub use layout::{StorageLayout, DECOMPILED_DIR};
pub use pipeline::TaskPipeline;
pub use store::{ApkStore, InMemoryApkStore, InMemoryTaskStore, TaskStore};
pub use task::{Task, TaskStatus};
