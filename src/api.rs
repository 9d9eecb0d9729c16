//! HTTP route handlers for the dashboard API.
//!
//! All endpoints speak JSON; error bodies are `{"message": "..."}` to match
//! what the dashboard shell expects. Source creation accepts multipart form
//! data carrying either an uploaded `file` or a `filePath` pointing at a
//! document already on disk.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

use indexmap::IndexMap;

use crate::errors::RegistryError;
use crate::filter::filter_file;
use crate::model::{Source, StatusSnapshot, TagStats, TaskFile};
use crate::poll::SharedStatus;
use crate::registry::{MigrationOutcome, RegistryHandle};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub registry: RegistryHandle,
    pub status: SharedStatus,
}

pub type SharedState = Arc<AppState>;

// ── Request/response payload types ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub source: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<Source>,
}

#[derive(Serialize)]
pub struct TasksResponse {
    pub tags: TaskFile,
    pub stats: IndexMap<String, TagStats>,
    pub source: Source,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"message": message}))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        if err.is_bad_request() {
            ApiError::BadRequest(err.to_string())
        } else if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else {
            tracing::error!(error = %err, "registry operation failed");
            ApiError::Internal(err.to_string())
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/sources", get(list_sources).post(create_source))
        .route("/api/sources/migrate", post(migrate_sources))
        .route("/api/sources/{id}", delete(delete_source))
        .route("/api/tasks", get(get_tasks))
        .route("/api/upload", post(upload_legacy))
        .route("/api/status", get(get_status))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_sources(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let sources = state.registry.call(|r| r.validate()).await?;
    Ok(Json(SourcesResponse { sources }))
}

async fn create_source(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut name: Option<String> = None;
    let mut file: Option<(String, String)> = None;
    let mut file_path: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let field_name = field.name().map(|s| s.to_string());
        match field_name.as_deref() {
            Some("name") => {
                name = Some(read_text_field(field).await?);
            }
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "upload.json".to_string());
                let content = read_text_field(field).await?;
                file = Some((file_name, content));
            }
            Some("filePath") => {
                file_path = Some(read_text_field(field).await?);
            }
            _ => {}
        }
    }

    // The missing-input check comes before name validation (which the
    // registry performs), so a fully empty form reports the absent file.
    let name = name.unwrap_or_default();
    let source = match (file, file_path) {
        (Some((file_name, content)), _) => {
            state
                .registry
                .call(move |r| r.create_upload(&name, &file_name, &content))
                .await?
        }
        (None, Some(path)) => {
            state
                .registry
                .call(move |r| r.create_from_path(&name, &path))
                .await?
        }
        (None, None) => return Err(RegistryError::MissingInput.into()),
    };

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "source": source,
            "message": "Source created successfully"
        })),
    ))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn delete_source(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.call(move |r| r.delete(&id)).await?;
    Ok(Json(serde_json::json!({
        "message": "Source deleted successfully"
    })))
}

async fn migrate_sources(State(state): State<SharedState>) -> Response {
    match state.registry.call(|r| r.migrate_legacy()).await {
        Ok(MigrationOutcome::NoLegacyFile) => Json(serde_json::json!({
            "message": "No migration needed - no existing tasks.json found",
            "migrated": false
        }))
        .into_response(),
        Ok(MigrationOutcome::SourcesExist) => Json(serde_json::json!({
            "message": "Migration not needed - sources already exist",
            "migrated": false
        }))
        .into_response(),
        Ok(MigrationOutcome::Migrated(source)) => Json(serde_json::json!({
            "message": "Successfully migrated existing tasks.json to sources",
            "migrated": true,
            "source": source
        }))
        .into_response(),
        Err(RegistryError::InvalidJson { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "message": "Invalid JSON in existing tasks.json",
                "migrated": false
            })),
        )
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn get_tasks(
    State(state): State<SharedState>,
    Query(query): Query<TasksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let source_id = query
        .source
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Source ID is required".to_string()))?;

    let (source, content) = state
        .registry
        .call(move |r| r.read_source(&source_id))
        .await?;

    let mut tags: TaskFile = serde_json::from_str(&content).map_err(|e| {
        tracing::error!(source = %source.id, error = %e, "task document is not parsable");
        ApiError::Internal("Error reading tasks file".to_string())
    })?;

    if let Some(ref tag) = query.tag {
        match tags.shift_remove_entry(tag) {
            Some((name, group)) => {
                tags = TaskFile::new();
                tags.insert(name, group);
            }
            None => {
                return Err(ApiError::NotFound(format!("Tag '{}' not found", tag)));
            }
        }
    }

    // Stats reflect each tag's full task list; a search term narrows the
    // tasks shown but not the reported progress.
    let stats: IndexMap<String, TagStats> = tags
        .iter()
        .map(|(name, group)| (name.clone(), group.stats()))
        .collect();

    if let Some(ref term) = query.q {
        filter_file(&mut tags, term);
    }

    Ok(Json(TasksResponse { tags, stats, source }))
}

async fn upload_legacy(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            let file_name = field
                .file_name()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "upload.json".to_string());
            let content = read_text_field(field).await?;
            file = Some((file_name, content));
        }
    }

    let (file_name, content) =
        file.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    state
        .registry
        .call(move |r| r.store_legacy_upload(&file_name, &content))
        .await?;
    Ok(Json(serde_json::json!({
        "message": "File uploaded successfully"
    })))
}

async fn get_status(State(state): State<SharedState>) -> Json<StatusSnapshot> {
    Json(state.status.read().await.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::shared_status;
    use crate::registry::SourceRegistry;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const VALID_DOC: &str = r#"{
        "master": {
            "tasks": [
                {"id": 1, "title": "Build parser", "status": "done",
                 "subtasks": [{"id": 1, "title": "Lexer", "status": "done"}]},
                {"id": 2, "title": "Write docs", "status": "pending"}
            ],
            "metadata": {"created": "", "updated": "", "description": ""}
        },
        "feature-x": {"tasks": [{"id": 3, "title": "Spike", "status": "pending"}]}
    }"#;

    fn test_app(dir: &TempDir) -> Router {
        let registry = RegistryHandle::new(SourceRegistry::new(dir.path().join("sources")));
        let state = Arc::new(AppState {
            registry,
            status: shared_status(),
        });
        api_router().with_state(state)
    }

    const BOUNDARY: &str = "----taskmon-test-boundary";

    fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, filename, value) in parts {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match filename {
                Some(fname) => {
                    body.push_str(&format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, fname
                    ));
                    body.push_str("Content-Type: application/json\r\n\r\n");
                }
                None => {
                    body.push_str(&format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        name
                    ));
                }
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_upload_source(app: &Router, name: &str) -> String {
        let req = multipart_request(
            "/api/sources",
            &[
                ("name", None, name),
                ("file", Some("tasks.json"), VALID_DOC),
            ],
        );
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        body["source"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_sources_empty() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/sources")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["sources"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_create_source_via_upload() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let id = create_upload_source(&app, "My Tasks").await;
        assert!(!id.is_empty());

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/sources")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["sources"].as_array().unwrap().len(), 1);
        assert_eq!(body["sources"][0]["name"], "My Tasks");
        assert_eq!(body["sources"][0]["hasError"], false);
    }

    #[tokio::test]
    async fn test_create_source_via_file_path() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("on-disk.json");
        std::fs::write(&doc, VALID_DOC).unwrap();

        let app = test_app(&dir);
        let req = multipart_request(
            "/api/sources",
            &[
                ("name", None, "On Disk"),
                ("filePath", None, doc.to_str().unwrap()),
            ],
        );
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        assert_eq!(body["source"]["isUploaded"], false);
        assert_eq!(body["source"]["fileName"], "on-disk.json");
    }

    #[tokio::test]
    async fn test_create_source_requires_name() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let req = multipart_request(
            "/api/sources",
            &[("file", Some("tasks.json"), VALID_DOC)],
        );
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "Source name is required");
    }

    #[tokio::test]
    async fn test_create_source_requires_file_or_path() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let req = multipart_request("/api/sources", &[("name", None, "Nameless")]);
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "Either file upload or file path is required");
    }

    #[tokio::test]
    async fn test_create_source_empty_form_reports_missing_file_first() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        // Neither name nor file/path given: the missing file wins.
        let req = multipart_request("/api/sources", &[("other", None, "x")]);
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "Either file upload or file path is required");
    }

    #[tokio::test]
    async fn test_create_source_rejects_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        create_upload_source(&app, "Same").await;

        let req = multipart_request(
            "/api/sources",
            &[("name", None, "same"), ("file", Some("t.json"), VALID_DOC)],
        );
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "Source name already exists");
    }

    #[tokio::test]
    async fn test_create_source_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let req = multipart_request(
            "/api/sources",
            &[("name", None, "Bad"), ("file", Some("t.json"), "{broken")],
        );
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_source() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let id = create_upload_source(&app, "Doomed").await;

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/sources/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/sources/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_tasks_returns_tags_and_source() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let id = create_upload_source(&app, "Tasks").await;

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks?source={}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["tags"]["master"]["tasks"].as_array().unwrap().len(), 2);
        assert_eq!(body["source"]["id"], id.as_str());
        assert!(body["source"]["lastUsed"].is_string());
    }

    #[tokio::test]
    async fn test_get_tasks_reports_per_tag_stats() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let id = create_upload_source(&app, "Tasks").await;

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks?source={}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["stats"]["master"]["total"], 2);
        assert_eq!(body["stats"]["master"]["donePercent"], 50);
        assert_eq!(body["stats"]["master"]["statusCounts"]["done"], 1);
        assert_eq!(body["stats"]["master"]["statusCounts"]["pending"], 1);
        assert_eq!(body["stats"]["feature-x"]["donePercent"], 0);
    }

    #[tokio::test]
    async fn test_get_tasks_requires_source_param() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/tasks")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "Source ID is required");
    }

    #[tokio::test]
    async fn test_get_tasks_unknown_source_is_404() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/tasks?source=nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_tasks_with_search_term() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let id = create_upload_source(&app, "Tasks").await;

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks?source={}&q=parser", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(resp).await;
        let master = body["tags"]["master"]["tasks"].as_array().unwrap();
        assert_eq!(master.len(), 1);
        assert_eq!(master[0]["title"], "Build parser");
        // Non-matching tags stay present with empty task lists
        assert_eq!(body["tags"]["feature-x"]["tasks"].as_array().unwrap().len(), 0);
        // Stats still describe the unfiltered tag
        assert_eq!(body["stats"]["master"]["total"], 2);
    }

    #[tokio::test]
    async fn test_get_tasks_with_tag_narrowing() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let id = create_upload_source(&app, "Tasks").await;

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks?source={}&tag=feature-x", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert!(body["tags"].get("master").is_none());
        assert_eq!(body["tags"]["feature-x"]["tasks"][0]["id"], 3);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks?source={}&tag=missing", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_migrate_no_legacy_file() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sources/migrate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["migrated"], false);
    }

    #[tokio::test]
    async fn test_upload_then_migrate() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let req = multipart_request("/api/upload", &[("file", Some("tasks.json"), VALID_DOC)]);
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sources/migrate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["migrated"], true);
        assert_eq!(body["source"]["name"], "Migrated Tasks");

        // Second migrate is a no-op: sources now exist
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sources/migrate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["migrated"], false);
    }

    #[tokio::test]
    async fn test_upload_requires_file() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let req = multipart_request("/api/upload", &[("other", None, "x")]);
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "disconnected");
    }
}
