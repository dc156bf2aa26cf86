//! REST API
//!
//! Thin endpoints over the registry, intake pipeline, and invocation
//! engine:
//!
//! - `POST   /functions`     — multipart upload (`name`, `version`?,
//!   `description`?, `file`), returns the registered Function JSON
//! - `GET    /functions`     — list all registered functions
//! - `GET    /functions/:id` — fetch one function
//! - `DELETE /functions/:id` — delete artifacts and registry entry
//! - `POST   /invoke/:id`    — form-encoded `input`, returns the
//!   invocation result envelope
//! - `GET    /health`        — liveness plus registered-function count

use crate::error::{FuncletError, Result};
use crate::function::{FunctionRecord, InvokeResult};
use crate::intake::{IntakePipeline, UploadRequest};
use crate::invoke::InvocationEngine;
use crate::registry::FunctionRegistry;
use crate::store::ArtifactStore;
use axum::extract::{DefaultBodyLimit, Form, Multipart, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Shared application state, constructed once at startup and injected into
/// every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FunctionRegistry>,
    pub store: ArtifactStore,
    pub intake: Arc<IntakePipeline>,
    pub engine: Arc<InvocationEngine>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(base_dir: &Path, invoke_timeout: Duration, max_upload_bytes: usize) -> Result<Self> {
        let registry = Arc::new(FunctionRegistry::new());
        let store = ArtifactStore::open(base_dir)?;
        let intake = Arc::new(IntakePipeline::new(store.clone(), registry.clone()));
        let engine = Arc::new(InvocationEngine::new(registry.clone(), invoke_timeout));
        Ok(Self {
            registry,
            store,
            intake,
            engine,
            max_upload_bytes,
        })
    }

    /// Rebuild the registry from the artifact store's base directory.
    pub fn hydrate(&self) -> Result<()> {
        self.registry.hydrate(self.store.base())
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;
    Router::new()
        .route("/functions", post(register_function).get(list_functions))
        .route(
            "/functions/:id",
            get(get_function).delete(delete_function),
        )
        .route("/invoke/:id", post(invoke_function))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

impl IntoResponse for FuncletError {
    fn into_response(self) -> Response {
        let status = match &self {
            FuncletError::NotFound(_) => StatusCode::NOT_FOUND,
            FuncletError::BadRequest(_) | FuncletError::IllegalPath(_) => StatusCode::BAD_REQUEST,
            FuncletError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

async fn register_function(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<FunctionRecord>, FuncletError> {
    let mut name = String::new();
    let mut version: Option<String> = None;
    let mut description = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FuncletError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => name = read_text(field).await?,
            "version" => version = Some(read_text(field).await?),
            "description" => description = read_text(field).await?,
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| FuncletError::BadRequest(format!("reading upload: {e}")))?;
                file = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (filename, payload) =
        file.ok_or_else(|| FuncletError::BadRequest("file field is required".into()))?;
    let extension = Path::new(&filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    info!(name = %name, file = %filename, bytes = payload.len(), "upload received");

    let record = state
        .intake
        .register(UploadRequest {
            name,
            version,
            description,
            extension,
            payload,
        })
        .await
        .map_err(|e| match e {
            // A source tree without an entrypoint is an unusable upload,
            // not a missing resource.
            FuncletError::NotFound(msg) => FuncletError::BadRequest(msg),
            other => other,
        })?;

    Ok(Json(record))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| FuncletError::BadRequest(format!("malformed multipart field: {e}")))
}

async fn list_functions(State(state): State<AppState>) -> Json<Vec<FunctionRecord>> {
    Json(state.registry.list())
}

async fn get_function(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> std::result::Result<Json<FunctionRecord>, FuncletError> {
    Ok(Json(state.registry.get(parse_id(&id)?)?))
}

async fn delete_function(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> std::result::Result<Json<serde_json::Value>, FuncletError> {
    let id = parse_id(&id)?;
    let record = state.registry.get(id)?;
    state.store.remove(&record)?;
    state.registry.remove(id)?;
    info!(id = %id, name = %record.name, version = %record.version, "function deleted");
    Ok(Json(serde_json::json!({ "success": "true" })))
}

#[derive(Debug, Deserialize)]
struct InvokeForm {
    #[serde(default)]
    input: String,
}

async fn invoke_function(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
    Form(form): Form<InvokeForm>,
) -> std::result::Result<Json<InvokeResult>, FuncletError> {
    let result = state.engine.invoke(parse_id(&id)?, &form.input).await?;
    Ok(Json(result))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "functions": state.registry.len(),
    }))
}

/// Ids come in as opaque path segments; anything that is not a UUID cannot
/// name a registered function.
fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| FuncletError::NotFound(format!("no function with id {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "funclet-test-boundary";

    fn test_app() -> (tempfile::TempDir, AppState, Router) {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::new(tmp.path(), Duration::from_secs(5), 8 * 1024 * 1024).unwrap();
        let router = router(state.clone());
        (tmp, state, router)
    }

    fn multipart_upload(
        name: Option<&str>,
        version: Option<&str>,
        file: Option<(&str, &[u8])>,
    ) -> Request<Body> {
        let mut body = Vec::new();
        let mut push_text = |field: &str, value: &str| {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        };
        if let Some(name) = name {
            push_text("name", name);
        }
        if let Some(version) = version {
            push_text("version", version);
        }
        if let Some((filename, content)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::post("/functions")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_tmp, _state, app) = test_app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["functions"], 0);
    }

    #[tokio::test]
    async fn test_register_prebuilt_function() {
        let (_tmp, _state, app) = test_app();
        let response = app
            .oneshot(multipart_upload(
                Some("echo"),
                Some("v1"),
                Some(("echo.sh", b"#!/bin/sh\ncat\n")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["name"], "echo");
        assert_eq!(json["version"], "v1");
        assert_eq!(json["wasmPath"], "");
        assert!(json["binPath"].as_str().unwrap().ends_with("main.bin"));
        assert!(Uuid::parse_str(json["id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_register_without_file_is_400() {
        let (_tmp, _state, app) = test_app();
        let response = app
            .oneshot(multipart_upload(Some("echo"), None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_unsafe_name_is_400() {
        let (_tmp, _state, app) = test_app();
        let response = app
            .oneshot(multipart_upload(
                Some("../escape"),
                Some("v1"),
                Some(("f.sh", b"#!/bin/sh\ntrue\n")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_duplicate_version_is_409() {
        let (_tmp, _state, app) = test_app();
        let first = app
            .clone()
            .oneshot(multipart_upload(
                Some("echo"),
                Some("v1"),
                Some(("f.sh", b"#!/bin/sh\ntrue\n")),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(multipart_upload(
                Some("echo"),
                Some("v1"),
                Some(("f.sh", b"#!/bin/sh\ntrue\n")),
            ))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let (_tmp, _state, app) = test_app();
        let response = app
            .clone()
            .oneshot(multipart_upload(
                Some("echo"),
                Some("v1"),
                Some(("f.sh", b"#!/bin/sh\ntrue\n")),
            ))
            .await
            .unwrap();
        let id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(Request::get("/functions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let list = json_body(response).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let response = app
            .oneshot(
                Request::get(format!("/functions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["name"], "echo");
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_404() {
        let (_tmp, _state, app) = test_app();
        for id in [Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
            let response = app
                .clone()
                .oneshot(
                    Request::get(format!("/functions/{id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_delete_removes_artifacts_and_entry() {
        let (tmp, state, app) = test_app();
        let response = app
            .clone()
            .oneshot(multipart_upload(
                Some("echo"),
                Some("v1"),
                Some(("f.sh", b"#!/bin/sh\ntrue\n")),
            ))
            .await
            .unwrap();
        let id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/functions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["success"], "true");

        assert!(state.registry.is_empty());
        assert!(!tmp.path().join("echo").join("v1").exists());

        // Deleting again is a 404.
        let response = app
            .oneshot(
                Request::delete(format!("/functions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_roundtrip() {
        let (_tmp, _state, app) = test_app();
        let response = app
            .clone()
            .oneshot(multipart_upload(
                Some("echo"),
                Some("v1"),
                Some(("echo.sh", b"#!/bin/sh\ncat\n")),
            ))
            .await
            .unwrap();
        let id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::post(format!("/invoke/{id}"))
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("input=ping"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["Stdout"], "ping");
        assert_eq!(json["ExitCode"], 0);
        assert!(json["DurationMs"].as_i64().unwrap() >= 0);
    }

    #[tokio::test]
    async fn test_invoke_unknown_id_is_404() {
        let (_tmp, _state, app) = test_app();
        let response = app
            .oneshot(
                Request::post(format!("/invoke/{}", Uuid::new_v4()))
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("input=x"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
