//! Task pipeline integration tests.
//!
//! Drives [`TaskPipeline`] and [`TaskDispatcher`] against real temporary
//! storage, with in-process fakes standing in for apktool.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use af_apk::{Decompiler, Recompiler};
use af_core::config::WorkspaceRetention;
use af_core::{ApkId, Error, TaskId};
use af_pipeline::{
    ApkImporter, ApkStore, CacheStatus, ImportError, InMemoryApkStore, InMemoryTaskStore,
    StorageLayout, SubmitError, Task, TaskDispatcher, TaskPipeline, TaskStatus, TaskStore,
    DECOMPILED_DIR,
};
use af_rules::{ImageRule, ReplacementRule, ScriptRule};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tempfile::TempDir;

const MANIFEST: &str = r#"<manifest package="com.example.app" label="Example"/>"#;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// "Rebuilds" by writing the ZIP magic followed by the workspace manifest.
struct ManifestRecompiler;

#[async_trait]
impl Recompiler for ManifestRecompiler {
    async fn recompile(&self, source_dir: &Path, output: &Path) -> af_core::Result<()> {
        let manifest = tokio::fs::read(source_dir.join("AndroidManifest.xml")).await?;
        let mut artifact = b"PK\x03\x04".to_vec();
        artifact.extend_from_slice(&manifest);
        // Give concurrent tasks a chance to interleave.
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::fs::write(output, artifact).await?;
        Ok(())
    }
}

/// Writes a partial artifact, then fails the way apktool does.
struct FailingRecompiler {
    diagnostic: &'static str,
}

#[async_trait]
impl Recompiler for FailingRecompiler {
    async fn recompile(&self, _source_dir: &Path, output: &Path) -> af_core::Result<()> {
        tokio::fs::write(output, b"PK\x03").await?;
        Err(Error::tool(
            "apktool",
            format!("exited with code 1: {}", self.diagnostic),
        ))
    }
}

/// Blocks every rebuild until the test releases a permit.
struct GatedRecompiler {
    gate: Arc<tokio::sync::Semaphore>,
}

#[async_trait]
impl Recompiler for GatedRecompiler {
    async fn recompile(&self, source_dir: &Path, output: &Path) -> af_core::Result<()> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        ManifestRecompiler.recompile(source_dir, output).await
    }
}

/// Produces a small decompiled tree; payloads containing `corrupt` fail.
struct FakeDecompiler;

#[async_trait]
impl Decompiler for FakeDecompiler {
    async fn decompile(&self, apk: &Path, output_dir: &Path) -> af_core::Result<()> {
        let bytes = tokio::fs::read(apk).await?;
        if bytes.windows(7).any(|w| w == b"corrupt") {
            tokio::fs::create_dir_all(output_dir).await?;
            return Err(Error::tool(
                "apktool",
                "exited with code 1: Could not decode arsc file",
            ));
        }
        write_tree(output_dir);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn write_tree(root: &Path) {
    fs::create_dir_all(root.join("smali/com/example")).unwrap();
    fs::create_dir_all(root.join("res/drawable")).unwrap();
    fs::write(root.join("AndroidManifest.xml"), MANIFEST).unwrap();
    fs::write(
        root.join("smali/com/example/Main.smali"),
        "const-string v0, \"OldName\"\n",
    )
    .unwrap();
    fs::write(root.join("res/drawable/icon.png"), [0x89, b'P', b'N', b'G']).unwrap();
}

struct Fixture {
    _dir: TempDir,
    layout: StorageLayout,
    store: Arc<dyn TaskStore>,
    apks: Arc<InMemoryApkStore>,
    apk_id: ApkId,
}

impl Fixture {
    /// Storage with one uploaded package whose cache is ready.
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path().join("data"));
        layout.ensure_directories().unwrap();

        let apk_id = ApkId::new();
        fs::write(layout.apk_path(apk_id), b"PK\x03\x04original").unwrap();
        write_tree(&layout.cache_dir(apk_id).join(DECOMPILED_DIR));

        Self {
            _dir: dir,
            layout,
            store: Arc::new(InMemoryTaskStore::new()),
            apks: Arc::new(InMemoryApkStore::new()),
            apk_id,
        }
    }

    fn pipeline(&self, recompiler: impl Recompiler + 'static) -> TaskPipeline {
        TaskPipeline::new(self.store.clone(), self.layout.clone(), Arc::new(recompiler))
    }

    fn dispatcher(&self, recompiler: impl Recompiler + 'static) -> TaskDispatcher {
        TaskDispatcher::new(self.pipeline(recompiler), self.apks.clone(), 0)
    }

    fn cache_snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        snapshot(&self.layout.cache_dir(self.apk_id))
    }
}

fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let rel = path.strip_prefix(root).unwrap().to_path_buf();
            if path.is_dir() {
                out.insert(rel, Vec::new());
                walk(root, &path, out);
            } else {
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn script(path: &str, pattern: &str, replacement: &str) -> ReplacementRule {
    ScriptRule {
        target_path: path.into(),
        pattern: pattern.into(),
        replacement: replacement.into(),
        use_regex: false,
    }
    .into()
}

fn image(path: &str, bytes: &[u8]) -> ReplacementRule {
    ImageRule {
        target_path: path.into(),
        image_data: STANDARD.encode(bytes),
    }
    .into()
}

fn artifact_text(task: &Task) -> String {
    let bytes = fs::read(task.artifact.as_ref().unwrap()).unwrap();
    String::from_utf8_lossy(&bytes[4..]).to_string()
}

async fn wait_for(
    dispatcher: &TaskDispatcher,
    task_id: TaskId,
    pred: impl Fn(&Task) -> bool,
) -> Task {
    for _ in 0..500 {
        if let Some(task) = dispatcher.task(task_id) {
            if pred(&task) {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for task {task_id}");
}

// ---------------------------------------------------------------------------
// Successful runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_task_has_results_and_artifact() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(ManifestRecompiler);

    let rules = vec![
        script("AndroidManifest.xml", "com.example.app", "com.forked.app"),
        image("res/drawable/icon.png", b"new icon"),
    ];
    let task = dispatcher.run_to_completion(fx.apk_id, rules).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);
    assert_eq!(task.rule_results.len(), 2);
    assert!(task.rule_results.iter().all(|r| r.success));
    assert!(task.error.is_none());
    assert!(task.started_at.is_some() && task.completed_at.is_some());

    let artifact = dispatcher.artifact(task.task_id).unwrap();
    assert_eq!(artifact, fx.layout.output_path(task.task_id));
    assert!(artifact_text(&task).contains("com.forked.app"));

    // Default retention deletes the workspace after a successful build.
    assert!(!fx.layout.work_dir(task.task_id).exists());
}

#[tokio::test]
async fn all_rules_failing_still_completes() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(ManifestRecompiler);

    let rules = vec![
        script("smali/Missing.smali", "a", "b"),
        image("res/drawable/missing.png", b"x"),
    ];
    let task = dispatcher.run_to_completion(fx.apk_id, rules).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.rule_results.len(), 2);
    assert!(task.rule_results.iter().all(|r| !r.success));
    assert_eq!(task.rule_results[0].rule_index, 0);
    assert_eq!(task.rule_results[1].rule_index, 1);
    assert!(fx.layout.output_path(task.task_id).is_file());
    assert_eq!(artifact_text(&task), MANIFEST);
}

#[tokio::test]
async fn rule_failure_does_not_abort_batch() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(ManifestRecompiler);

    let rules = vec![
        script("AndroidManifest.xml", "com.example.app", "com.step.one"),
        script("does/not/exist.xml", "x", "y"),
        script("AndroidManifest.xml", "com.step.one", "com.step.two"),
    ];
    let task = dispatcher.run_to_completion(fx.apk_id, rules).await.unwrap();

    let flags: Vec<bool> = task.rule_results.iter().map(|r| r.success).collect();
    assert_eq!(flags, vec![true, false, true]);
    assert!(task.rule_results[1].message.contains("does/not/exist.xml"));
    // The third rule saw the first rule's write.
    assert!(artifact_text(&task).contains("com.step.two"));
}

#[tokio::test]
async fn keep_retention_leaves_workspace() {
    let fx = Fixture::new();
    let pipeline = fx
        .pipeline(ManifestRecompiler)
        .with_retention(WorkspaceRetention::Keep);
    let dispatcher = TaskDispatcher::new(pipeline, fx.apks.clone(), 0);

    let rules = vec![script("AndroidManifest.xml", "Example", "Kept")];
    let task = dispatcher.run_to_completion(fx.apk_id, rules).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    let kept = fx
        .layout
        .work_dir(task.task_id)
        .join(DECOMPILED_DIR)
        .join("AndroidManifest.xml");
    assert!(fs::read_to_string(kept).unwrap().contains("Kept"));
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cache_is_never_modified() {
    let fx = Fixture::new();
    let before = fx.cache_snapshot();

    let rules = vec![
        script("AndroidManifest.xml", "com.example.app", "com.changed"),
        script("smali/com/example/Main.smali", "OldName", "NewName"),
        image("res/drawable/icon.png", b"\x00"),
    ];

    let ok = fx.dispatcher(ManifestRecompiler);
    let task = ok.run_to_completion(fx.apk_id, rules.clone()).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    let failing = fx.dispatcher(FailingRecompiler { diagnostic: "boom" });
    let task = failing.run_to_completion(fx.apk_id, rules).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);

    assert_eq!(fx.cache_snapshot(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_tasks_produce_independent_artifacts() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(ManifestRecompiler);

    let (a, b) = tokio::join!(
        dispatcher.run_to_completion(
            fx.apk_id,
            vec![script("AndroidManifest.xml", "com.example.app", "com.alpha")],
        ),
        dispatcher.run_to_completion(
            fx.apk_id,
            vec![script("AndroidManifest.xml", "com.example.app", "com.beta")],
        ),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.task_id, b.task_id);
    assert_eq!(a.status, TaskStatus::Completed);
    assert_eq!(b.status, TaskStatus::Completed);

    let text_a = artifact_text(&a);
    let text_b = artifact_text(&b);
    assert!(text_a.contains("com.alpha") && !text_a.contains("com.beta"));
    assert!(text_b.contains("com.beta") && !text_b.contains("com.alpha"));
}

// ---------------------------------------------------------------------------
// Terminal failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recompile_failure_fails_task_and_cleans_up() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(FailingRecompiler {
        diagnostic: "brut.androlib.AndrolibException: injected failure",
    });

    let rules = vec![script("AndroidManifest.xml", "Example", "Broken")];
    let task = dispatcher.run_to_completion(fx.apk_id, rules).await.unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    let error = task.error.as_deref().unwrap();
    assert!(error.contains("recompile"), "{error}");
    assert!(error.contains("injected failure"), "{error}");
    assert!(task.completed_at.is_some());

    assert!(!fx.layout.work_dir(task.task_id).exists());
    assert!(!fx.layout.output_path(task.task_id).exists());
    assert!(matches!(
        dispatcher.artifact(task.task_id),
        Err(Error::ArtifactMissing { .. })
    ));
}

#[tokio::test]
async fn isolation_failure_is_terminal() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(ManifestRecompiler);

    // A package with no cache at all.
    let orphan = ApkId::new();
    let task = Task::new(orphan);
    let task_id = task.task_id;
    fx.store.put(task);

    pipeline
        .run(task_id, orphan, vec![script("AndroidManifest.xml", "a", "b")])
        .await;

    let task = fx.store.get(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    let error = task.error.unwrap();
    assert!(error.contains("isolate"), "{error}");
    assert!(task.rule_results.is_empty());
    assert!(!fx.layout.work_dir(task_id).exists());
    assert!(!fx.layout.output_path(task_id).exists());
}

#[tokio::test]
async fn run_is_single_shot() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(ManifestRecompiler);

    let task = Task::new(fx.apk_id);
    let task_id = task.task_id;
    fx.store.put(task);

    pipeline.run(task_id, fx.apk_id, Vec::new()).await;
    let first = fx.store.get(task_id).unwrap();
    assert_eq!(first.status, TaskStatus::Completed);

    // A second run neither re-executes nor touches the record.
    pipeline
        .run(task_id, fx.apk_id, vec![script("AndroidManifest.xml", "a", "b")])
        .await;
    let second = fx.store.get(task_id).unwrap();
    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(second.completed_at, first.completed_at);
    assert!(second.rule_results.is_empty());

    // Unknown tasks are ignored.
    pipeline.run(TaskId::new(), fx.apk_id, Vec::new()).await;
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_rejects_before_creating_tasks() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(ManifestRecompiler);

    let unknown = dispatcher.submit(ApkId::new(), Vec::new()).unwrap_err();
    assert!(matches!(unknown, SubmitError::ApkNotFound(_)));

    let uncached = ApkId::new();
    fs::write(fx.layout.apk_path(uncached), b"PK\x03\x04").unwrap();
    let not_ready = dispatcher.submit(uncached, Vec::new()).unwrap_err();
    assert!(matches!(not_ready, SubmitError::CacheNotReady(id) if id == uncached));

    let invalid = dispatcher
        .submit(
            fx.apk_id,
            vec![
                script("AndroidManifest.xml", "ok", "ok"),
                script("/../etc/passwd", "", "x"),
            ],
        )
        .unwrap_err();
    match invalid {
        SubmitError::InvalidRules(errors) => {
            assert_eq!(errors.len(), 3);
            assert!(errors.iter().all(|e| e.rule_index == 1));
        }
        other => panic!("expected InvalidRules, got {other:?}"),
    }

    assert!(dispatcher.tasks().is_empty());
}

#[tokio::test]
async fn submit_returns_pending_immediately() {
    let fx = Fixture::new();
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let dispatcher = fx.dispatcher(GatedRecompiler { gate: gate.clone() });

    let task = dispatcher.submit(fx.apk_id, Vec::new()).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    wait_for(&dispatcher, task.task_id, |t| t.status == TaskStatus::Processing).await;
    assert!(matches!(
        dispatcher.artifact(task.task_id),
        Err(Error::ArtifactMissing { .. })
    ));

    gate.add_permits(1);
    let done = wait_for(&dispatcher, task.task_id, Task::is_terminal).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(dispatcher.artifact(task.task_id).is_ok());
}

#[tokio::test]
async fn concurrency_limit_keeps_tasks_pending() {
    let fx = Fixture::new();
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let dispatcher = TaskDispatcher::new(
        fx.pipeline(GatedRecompiler { gate: gate.clone() }),
        fx.apks.clone(),
        1,
    );

    let first = dispatcher.submit(fx.apk_id, Vec::new()).unwrap();
    let second = dispatcher.submit(fx.apk_id, Vec::new()).unwrap();

    let processing = |id: TaskId| dispatcher.task(id).unwrap().status == TaskStatus::Processing;
    for _ in 0..500 {
        if processing(first.task_id) || processing(second.task_id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let statuses = [
        dispatcher.task(first.task_id).unwrap().status,
        dispatcher.task(second.task_id).unwrap().status,
    ];
    assert!(statuses.contains(&TaskStatus::Processing), "{statuses:?}");
    assert!(statuses.contains(&TaskStatus::Pending), "{statuses:?}");

    gate.add_permits(1);
    let first = wait_for(&dispatcher, first.task_id, Task::is_terminal).await;
    let second = wait_for(&dispatcher, second.task_id, Task::is_terminal).await;
    assert_eq!(first.status, TaskStatus::Completed);
    assert_eq!(second.status, TaskStatus::Completed);
}

#[tokio::test]
async fn artifact_unknown_task_is_not_found() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(ManifestRecompiler);
    assert!(matches!(
        dispatcher.artifact(TaskId::new()),
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn artifact_requires_file_on_disk() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(ManifestRecompiler);
    let task = dispatcher
        .run_to_completion(fx.apk_id, Vec::new())
        .await
        .unwrap();
    assert!(dispatcher.artifact(task.task_id).is_ok());

    fs::remove_file(fx.layout.output_path(task.task_id)).unwrap();
    assert!(matches!(
        dispatcher.artifact(task.task_id),
        Err(Error::ArtifactMissing { .. })
    ));
}

#[tokio::test]
async fn delete_apk_removes_tasks_and_storage() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(ManifestRecompiler);
    let task = dispatcher
        .run_to_completion(fx.apk_id, Vec::new())
        .await
        .unwrap();

    dispatcher.delete_apk(fx.apk_id).await.unwrap();

    assert!(dispatcher.task(task.task_id).is_none());
    assert!(!fx.layout.apk_exists(fx.apk_id));
    assert!(!fx.layout.cache_dir(fx.apk_id).exists());
    assert!(!fx.layout.output_path(task.task_id).exists());

    assert!(matches!(
        dispatcher.delete_apk(fx.apk_id).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn delete_apk_conflicts_with_running_task() {
    let fx = Fixture::new();
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let dispatcher = fx.dispatcher(GatedRecompiler { gate: gate.clone() });

    let task = dispatcher.submit(fx.apk_id, Vec::new()).unwrap();
    wait_for(&dispatcher, task.task_id, |t| t.status == TaskStatus::Processing).await;

    let err = dispatcher.delete_apk(fx.apk_id).await.unwrap_err();
    assert_eq!(err.http_status(), 409);
    assert!(fx.layout.cache_ready(fx.apk_id));

    gate.add_permits(1);
    wait_for(&dispatcher, task.task_id, Task::is_terminal).await;
    dispatcher.delete_apk(fx.apk_id).await.unwrap();
}

#[tokio::test]
async fn delete_apk_conflicts_while_decompiling() {
    let fx = Fixture::new();
    let dispatcher = fx.dispatcher(ManifestRecompiler);
    fx.apks.put(af_pipeline::ApkRecord::new(fx.apk_id, "app.apk", 12));

    let err = dispatcher.delete_apk(fx.apk_id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert!(fx.layout.apk_exists(fx.apk_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submit_racing_delete_never_orphans_tasks() {
    for _ in 0..50 {
        let fx = Fixture::new();
        let dispatcher = Arc::new(fx.dispatcher(ManifestRecompiler));
        let apk_id = fx.apk_id;

        let deleter = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.delete_apk(apk_id).await })
        };

        let mut accepted = Vec::new();
        while !deleter.is_finished() {
            match dispatcher.submit(apk_id, Vec::new()) {
                Ok(task) => accepted.push(task.task_id),
                Err(SubmitError::ApkNotFound(_)) => {}
                Err(e) => panic!("unexpected submit error: {e}"),
            }
            tokio::task::yield_now().await;
        }

        match deleter.await.unwrap() {
            Ok(()) => {
                // Everything accepted before the delete was swept with it.
                assert!(fx.store.list_for_apk(apk_id).is_empty());
                assert!(accepted.iter().all(|id| dispatcher.task(*id).is_none()));
                assert!(!fx.layout.apk_exists(apk_id));
                assert!(!fx.layout.cache_dir(apk_id).exists());
                assert!(matches!(
                    dispatcher.submit(apk_id, Vec::new()),
                    Err(SubmitError::ApkNotFound(_))
                ));
            }
            Err(e) => {
                assert!(matches!(e, Error::Conflict(_)), "{e}");
                assert!(fx.layout.cache_ready(apk_id));
                for task_id in accepted {
                    let task = wait_for(&dispatcher, task_id, Task::is_terminal).await;
                    assert_eq!(task.status, TaskStatus::Completed);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

fn importer(layout: &StorageLayout, apks: &Arc<InMemoryApkStore>, max_bytes: u64) -> ApkImporter {
    ApkImporter::new(layout.clone(), apks.clone(), Arc::new(FakeDecompiler), max_bytes)
}

/// A stored (uncompressed) ZIP archive holding `entries`.
fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn apk_bytes(manifest: &[u8]) -> Vec<u8> {
    zip_bytes(&[("AndroidManifest.xml", manifest), ("classes.dex", b"dex\n035".as_slice())])
}

#[tokio::test]
async fn import_builds_ready_cache() {
    let dir = TempDir::new().unwrap();
    let layout = StorageLayout::new(dir.path());
    let apks = Arc::new(InMemoryApkStore::new());
    let bytes = apk_bytes(b"<manifest/>");

    let record = importer(&layout, &apks, 64 * 1024)
        .import(&bytes, "demo.apk")
        .await
        .unwrap();

    assert_eq!(record.filename, "demo.apk");
    assert_eq!(record.size, bytes.len() as u64);
    assert_eq!(record.cache_status, CacheStatus::Ready);
    assert_eq!(apks.get(record.apk_id), Some(record.clone()));
    assert!(layout.apk_exists(record.apk_id));
    assert!(layout.cache_ready(record.apk_id));
    assert!(!layout.staging_dir(record.apk_id).exists());
    assert!(layout
        .cache_dir(record.apk_id)
        .join(DECOMPILED_DIR)
        .join("AndroidManifest.xml")
        .is_file());
}

#[tokio::test]
async fn import_rejects_bad_payloads() {
    let dir = TempDir::new().unwrap();
    let layout = StorageLayout::new(dir.path());
    let apks = Arc::new(InMemoryApkStore::new());

    let small = importer(&layout, &apks, 8);
    let too_large = small.import(b"PK\x03\x04 too large", "a.apk").await;
    assert!(matches!(too_large, Err(ImportError::TooLarge { size: 14, limit: 8 })));

    let importer = importer(&layout, &apks, 64 * 1024);
    let not_zip = importer.import(b"MZ\x90\x00", "a.exe").await;
    assert!(matches!(not_zip, Err(ImportError::NotAnApk(_))));

    let truncated = importer.import(b"PK\x03\x04payload", "a.apk").await;
    assert!(matches!(truncated, Err(ImportError::NotAnApk(_))));

    let plain_zip = zip_bytes(&[("readme.txt", b"hello".as_slice())]);
    let err = importer.import(&plain_zip, "a.zip").await.unwrap_err();
    assert!(err.to_string().contains("AndroidManifest.xml missing"), "{err}");

    // Rejected before anything touched the disk.
    assert!(!layout.uploads_dir().exists());
    assert!(apks.list().is_empty());
}

#[tokio::test]
async fn import_decompile_failure_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let layout = StorageLayout::new(dir.path());
    let apks = Arc::new(InMemoryApkStore::new());

    let err = importer(&layout, &apks, 64 * 1024)
        .import(&apk_bytes(b"corrupt"), "bad.apk")
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::Decompile(_)));
    assert!(err.to_string().contains("Could not decode arsc file"));

    assert_eq!(fs::read_dir(layout.uploads_dir()).unwrap().count(), 0);
    assert_eq!(fs::read_dir(layout.cache_root()).unwrap().count(), 0);
    assert!(apks.list().is_empty());
}
