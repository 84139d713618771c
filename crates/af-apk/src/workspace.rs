//! Task workspace isolation.
//!
//! [`isolate`] makes a private, byte-exact copy of a cached decompiled tree
//! for one task; [`discard`] removes a workspace when it is no longer needed.
//! The cache itself is only ever read.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use af_core::Error;
use walkdir::WalkDir;

/// Copy `cache_dir` recursively into the fresh location `workspace_dir`.
///
/// The copy runs on the blocking thread pool. Preconditions, checked in
/// order: the source exists and is a directory, it is non-empty, and the
/// destination does not exist. A destination created by this call is removed
/// again if the copy fails part-way; a pre-existing destination is never
/// touched.
///
/// # Errors
///
/// Every failure is an [`Error::Workspace`] carrying the underlying cause.
pub async fn isolate(cache_dir: &Path, workspace_dir: &Path) -> af_core::Result<()> {
    let src = cache_dir.to_path_buf();
    let dst = workspace_dir.to_path_buf();

    tokio::task::spawn_blocking(move || isolate_blocking(&src, &dst))
        .await
        .map_err(|e| Error::Workspace(format!("copy task aborted: {e}")))?
}

fn isolate_blocking(src: &Path, dst: &Path) -> af_core::Result<()> {
    if !src.is_dir() {
        return Err(Error::Workspace(format!(
            "source tree does not exist: {}",
            src.display()
        )));
    }

    let mut entries = fs::read_dir(src).map_err(|e| {
        Error::Workspace(format!("cannot read source tree {}: {e}", src.display()))
    })?;
    if entries.next().is_none() {
        return Err(Error::Workspace(format!(
            "source tree is empty: {}",
            src.display()
        )));
    }

    if dst.exists() {
        return Err(Error::Workspace(format!(
            "destination already exists: {}",
            dst.display()
        )));
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::Workspace(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    // create_dir (not create_dir_all) so a concurrent creator loses cleanly.
    fs::create_dir(dst).map_err(|e| {
        Error::Workspace(format!("cannot create destination {}: {e}", dst.display()))
    })?;

    match copy_tree(src, dst) {
        Ok(files) => {
            tracing::debug!(
                source = %src.display(),
                destination = %dst.display(),
                files,
                "Workspace isolated"
            );
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(dst) {
                tracing::warn!(
                    destination = %dst.display(),
                    "Failed to remove partial workspace: {cleanup}"
                );
            }
            Err(Error::Workspace(format!(
                "copy {} -> {} failed: {e}",
                src.display(),
                dst.display()
            )))
        }
    }
}

/// Copy every entry under `src` into the existing directory `dst`.
///
/// Symlinks are followed, so linked files are copied by content.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<usize> {
    let mut files = 0;

    for entry in WalkDir::new(src).min_depth(1).follow_links(true) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target: PathBuf = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            files += 1;
        }
    }

    Ok(files)
}

/// Remove a workspace directory, logging instead of failing.
///
/// A directory that is already gone is not an error.
pub async fn discard(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => tracing::debug!(path = %dir.display(), "Workspace removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %dir.display(), "Failed to remove workspace: {e}"),
    }
}
