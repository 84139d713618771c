use crate::server::{ApiError, AppContext};
use af_core::{ApkId, TaskId};
use af_pipeline::{ApkRecord, ApkSummary, FileNode, Task, TaskStatus};
use af_rules::{ReplacementRule, ValidationResult};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/apks",
            post(upload_apk)
                .layer(DefaultBodyLimit::disable())
                .get(list_apks),
        )
        .route("/apks/:apk_id", delete(delete_apk))
        .route("/apks/:apk_id/tasks", get(list_apk_tasks))
        .route("/apks/:apk_id/files", get(list_apk_files))
        .route("/apks/:apk_id/files/*path", get(read_apk_file))
        .route("/rules/validate", post(validate_rules))
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:task_id", get(get_task))
        .route("/download/:task_id", get(download))
}

fn parse_apk_id(raw: &str) -> Result<ApkId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "APK_NOT_FOUND", format!("APK {raw} not found")))
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::new(StatusCode::NOT_FOUND, "TASK_NOT_FOUND", format!("task not found: {raw}"))
    })
}

fn invalid_request(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request("INVALID_REQUEST", rejection.body_text())
}

// ---------------------------------------------------------------------------
// Packages
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UploadQuery {
    filename: Option<String>,
}

async fn upload_apk(
    State(ctx): State<AppContext>,
    Query(params): Query<UploadQuery>,
    body: Body,
) -> Result<Json<ApkRecord>, ApiError> {
    let limit = ctx.config.tasks.max_upload_bytes();
    // Read one byte past the limit so the importer can report the overflow.
    let read_limit = usize::try_from(limit.saturating_add(1)).unwrap_or(usize::MAX);

    let bytes = axum::body::to_bytes(body, read_limit).await.map_err(|e| {
        ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "FILE_TOO_LARGE",
            format!("upload exceeds the limit of {limit} bytes: {e}"),
        )
    })?;

    let filename = params.filename.unwrap_or_default();
    let record = ctx.importer.import(&bytes, &filename).await?;
    Ok(Json(record))
}

#[derive(Serialize)]
struct ApkList {
    apks: Vec<ApkSummary>,
}

async fn list_apks(State(ctx): State<AppContext>) -> Result<Json<ApkList>, ApiError> {
    let apks = ctx.catalog.list()?;
    Ok(Json(ApkList { apks }))
}

async fn list_apk_tasks(
    State(ctx): State<AppContext>,
    Path(apk_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let apk_id = parse_apk_id(&apk_id)?;
    let tasks: Vec<TaskSummary> = ctx.catalog.tasks(apk_id)?.iter().map(TaskSummary::from).collect();
    Ok(Json(serde_json::json!({ "tasks": tasks })))
}

#[derive(Serialize)]
struct FileTree {
    files: Vec<FileNode>,
}

async fn list_apk_files(
    State(ctx): State<AppContext>,
    Path(apk_id): Path<String>,
) -> Result<Json<FileTree>, ApiError> {
    let apk_id = parse_apk_id(&apk_id)?;
    let files = ctx.catalog.files(apk_id).await?;
    Ok(Json(FileTree { files }))
}

#[derive(Serialize)]
struct FileContent {
    path: String,
    content: String,
}

async fn read_apk_file(
    State(ctx): State<AppContext>,
    Path((apk_id, path)): Path<(String, String)>,
) -> Result<Json<FileContent>, ApiError> {
    let apk_id = parse_apk_id(&apk_id)?;
    let content = ctx.catalog.read_file(apk_id, &path).await?;
    Ok(Json(FileContent { path, content }))
}

async fn delete_apk(
    State(ctx): State<AppContext>,
    Path(apk_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let apk_id = parse_apk_id(&apk_id)?;

    ctx.dispatcher
        .delete_apk(apk_id)
        .await
        .map_err(|e| match e {
            af_core::Error::Conflict(message) => {
                ApiError::new(StatusCode::CONFLICT, "APK_BUSY", message)
            }
            other => other.into(),
        })?;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Accepts a bare rule array or `{"rules": [...]}`.
async fn validate_rules(
    State(ctx): State<AppContext>,
    body: String,
) -> Result<Json<ValidationResult>, ApiError> {
    let rules = af_rules::parse_rules(&body)
        .map_err(|e| ApiError::bad_request("INVALID_REQUEST", format!("malformed rules: {e}")))?;
    Ok(Json(ctx.dispatcher.validate(&rules)))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateTaskRequest {
    apk_id: String,
    rules: Vec<ReplacementRule>,
}

#[derive(Serialize)]
struct CreateTaskResponse {
    task_id: TaskId,
    status: TaskStatus,
}

async fn create_task(
    State(ctx): State<AppContext>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<Json<CreateTaskResponse>, ApiError> {
    let Json(payload) = payload.map_err(invalid_request)?;
    let apk_id = parse_apk_id(&payload.apk_id)?;

    let task = ctx.dispatcher.submit(apk_id, payload.rules)?;

    Ok(Json(CreateTaskResponse {
        task_id: task.task_id,
        status: task.status,
    }))
}

#[derive(Serialize)]
struct TaskSummary {
    task_id: TaskId,
    apk_id: ApkId,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id,
            apk_id: task.apk_id,
            status: task.status,
            created_at: task.created_at,
            completed_at: task.completed_at,
        }
    }
}

async fn list_tasks(State(ctx): State<AppContext>) -> impl IntoResponse {
    let tasks: Vec<TaskSummary> = ctx.dispatcher.tasks().iter().map(TaskSummary::from).collect();
    Json(serde_json::json!({ "tasks": tasks }))
}

#[derive(Serialize)]
struct TaskView {
    #[serde(flatten)]
    task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    download_url: Option<String>,
}

async fn get_task(
    State(ctx): State<AppContext>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let task = ctx
        .dispatcher
        .task(task_id)
        .ok_or_else(|| af_core::Error::not_found("task", task_id))?;

    let download_url = task
        .is_downloadable()
        .then(|| format!("/api/v1/download/{task_id}"));

    Ok(Json(TaskView { task, download_url }))
}

async fn download(
    State(ctx): State<AppContext>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let path = ctx.dispatcher.artifact(task_id)?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(af_core::Error::artifact_missing(task_id).into());
        }
        Err(e) => return Err(af_core::Error::from(e).into()),
    };

    Ok((
        [
            (header::CONTENT_TYPE, "application/vnd.android.package-archive".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{task_id}.apk\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
