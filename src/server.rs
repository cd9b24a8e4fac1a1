//! HTTP surface for modelbridge.
//!
//! Five JSON endpoints consumed by the browser frontend, all returning the
//! status/message envelope it expects:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/save-key` | Persist the OpenAI API key |
//! | `GET`  | `/load-key` | Return the saved key, if any |
//! | `GET`  | `/get-model` | Discover and read the running desktop model |
//! | `POST` | `/ask` | Answer a question about the selected tables |
//! | `GET`  | `/` | Health check listing the endpoints |
//!
//! Handlers are stateless per request: every `/get-model` re-discovers the
//! instance and re-invokes the helper; nothing is retained between requests.
//! "No data" outcomes (no key saved, no instance running) are structured
//! 200 responses, not HTTP errors — only genuine store failures surface as
//! 500s, and `/ask` always answers with a message string.
//!
//! CORS is fully permissive: the frontend is a local page opened straight
//! from disk.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::assistant::Assistant;
use crate::config::BridgeConfig;
use crate::credentials::CredentialStore;
use crate::desktop::{ModelReader, TableDescriptor};
use crate::error::BridgeError;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<CredentialStore>,
    reader: Arc<ModelReader>,
    assistant: Arc<Assistant>,
}

impl AppState {
    pub fn from_config(config: &BridgeConfig) -> crate::Result<Self> {
        let credentials_path = config
            .credentials_path
            .clone()
            .or_else(CredentialStore::default_path)
            .ok_or_else(|| {
                BridgeError::InvalidConfig(
                    "cannot determine a home directory for the credential file; set credentials_path"
                        .to_string(),
                )
            })?;
        Ok(Self {
            store: Arc::new(CredentialStore::new(credentials_path)),
            reader: Arc::new(ModelReader::from_config(&config.desktop)),
            assistant: Arc::new(Assistant::new(config.openai.clone())?),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SaveKeyRequest {
    #[serde(default)]
    key: String,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    selected_data: Vec<TableDescriptor>,
}

/// Build the application router with permissive CORS for the local frontend.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/save-key", post(save_key))
        .route("/load-key", get(load_key))
        .route("/get-model", get(get_model))
        .route("/ask", post(ask))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "modelbridge backend is running",
        "endpoints": ["/save-key", "/load-key", "/get-model", "/ask"],
    }))
}

async fn save_key(
    State(state): State<AppState>,
    Json(request): Json<SaveKeyRequest>,
) -> Response {
    let key = request.key.trim();
    if key.is_empty() {
        return error_envelope(StatusCode::BAD_REQUEST, "No key provided");
    }
    match state.store.save(key).await {
        Ok(()) => {
            Json(json!({"status": "ok", "message": "API key saved successfully"})).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to save API key");
            error_envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Error saving key: {e}"),
            )
        }
    }
}

async fn load_key(State(state): State<AppState>) -> Response {
    match state.store.load().await {
        Ok(Some(key)) => Json(json!({"status": "ok", "key": key})).into_response(),
        Ok(None) => {
            Json(json!({"status": "error", "message": "No API key saved"})).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load API key");
            error_envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Error loading key: {e}"),
            )
        }
    }
}

async fn get_model(State(state): State<AppState>) -> Json<serde_json::Value> {
    let model = state.reader.fetch_model().await;
    if model.is_empty() {
        Json(json!({
            "status": "error",
            "message": "No Power BI instance found or no tables available",
            "model": [],
        }))
    } else {
        Json(json!({"status": "ok", "model": model}))
    }
}

async fn ask(State(state): State<AppState>, Json(request): Json<AskRequest>) -> Json<serde_json::Value> {
    let answer = answer_question(&state, &request).await;
    Json(json!({"answer": answer}))
}

/// Resolve the `/ask` request to an answer string. Failures become
/// user-readable guidance in the answer itself, never an HTTP error.
async fn answer_question(state: &AppState, request: &AskRequest) -> String {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return "No prompt provided.".to_string();
    }
    if request.selected_data.is_empty() {
        return "No tables selected.".to_string();
    }
    let key = match state.store.load().await {
        Ok(Some(key)) => key,
        Ok(None) => {
            return "API key not loaded. Please save your OpenAI API key first.".to_string();
        }
        Err(e) => {
            tracing::error!(error = %e, "credential load failed while answering");
            return format!("Error reading the saved API key: {e}");
        }
    };
    match state
        .assistant
        .ask(&key, prompt, &request.selected_data)
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!(error = %e, "completion request failed");
            format!(
                "Error communicating with OpenAI: {e}. Check that your API key is valid, \
                 you have remaining quota, and your network connection is up."
            )
        }
    }
}

fn error_envelope(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"status": "error", "message": message}))).into_response()
}

/// Bind the configured address and serve until `cancel` fires.
pub async fn run_server(config: &BridgeConfig, cancel: CancellationToken) -> crate::Result<()> {
    config.validate()?;
    let state = AppState::from_config(config)?;
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Server(format!("failed to bind to {addr}: {e}")))?;

    tracing::info!(addr = %addr, "modelbridge HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| BridgeError::Server(e.to_string()))?;

    tracing::info!("modelbridge HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// App wired entirely to temp dirs: no saved key, no running instance.
    fn test_app(dir: &TempDir) -> Router {
        let workspaces = dir.path().join("workspaces");
        std::fs::create_dir_all(&workspaces).unwrap();
        let config = BridgeConfig {
            credentials_path: Some(dir.path().join("config.json")),
            desktop: crate::config::DesktopConfig {
                workspaces_dir: Some(workspaces),
                ..Default::default()
            },
            ..Default::default()
        };
        router(AppState::from_config(&config).expect("state should build"))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_lists_endpoints() {
        let dir = TempDir::new().unwrap();
        let response = test_app(&dir).oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["endpoints"]
            .as_array()
            .unwrap()
            .contains(&json!("/ask")));
    }

    #[tokio::test]
    async fn test_save_then_load_key_round_trip() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let response = app
            .clone()
            .oneshot(post_json("/save-key", json!({"key": "sk-test123"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        let response = app.oneshot(get_request("/load-key")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["key"], "sk-test123");
    }

    #[tokio::test]
    async fn test_save_key_rejects_empty_key() {
        let dir = TempDir::new().unwrap();
        let response = test_app(&dir)
            .oneshot(post_json("/save-key", json!({"key": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "No key provided");
    }

    #[tokio::test]
    async fn test_load_key_fresh_environment() {
        let dir = TempDir::new().unwrap();
        let response = test_app(&dir).oneshot(get_request("/load-key")).await.unwrap();
        // "Not configured" is a structured response, not an HTTP error
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "No API key saved");
    }

    #[tokio::test]
    async fn test_get_model_without_instance() {
        let dir = TempDir::new().unwrap();
        let response = test_app(&dir).oneshot(get_request("/get-model")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["model"], json!([]));
    }

    #[tokio::test]
    async fn test_ask_without_prompt() {
        let dir = TempDir::new().unwrap();
        let response = test_app(&dir)
            .oneshot(post_json("/ask", json!({"prompt": "", "selected_data": []})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["answer"], "No prompt provided.");
    }

    #[tokio::test]
    async fn test_ask_without_tables() {
        let dir = TempDir::new().unwrap();
        let response = test_app(&dir)
            .oneshot(post_json(
                "/ask",
                json!({"prompt": "best month?", "selected_data": []}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["answer"], "No tables selected.");
    }

    #[tokio::test]
    async fn test_ask_without_saved_key() {
        let dir = TempDir::new().unwrap();
        let response = test_app(&dir)
            .oneshot(post_json(
                "/ask",
                json!({
                    "prompt": "best month?",
                    "selected_data": [{"Name": "Sales", "Columns": ["Amount"]}],
                }),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(
            json["answer"],
            "API key not loaded. Please save your OpenAI API key first."
        );
    }

    #[tokio::test]
    async fn test_ask_surfaces_api_failure_as_answer_text() {
        let dir = TempDir::new().unwrap();
        let workspaces = dir.path().join("workspaces");
        std::fs::create_dir_all(&workspaces).unwrap();
        let config = BridgeConfig {
            credentials_path: Some(dir.path().join("config.json")),
            desktop: crate::config::DesktopConfig {
                workspaces_dir: Some(workspaces),
                ..Default::default()
            },
            openai: crate::config::OpenAiConfig {
                // Nothing listens on port 1
                api_url: "http://127.0.0.1:1/v1/chat/completions".to_string(),
                request_timeout_secs: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let app = router(AppState::from_config(&config).unwrap());

        let response = app
            .clone()
            .oneshot(post_json("/save-key", json!({"key": "sk-test123"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json(
                "/ask",
                json!({
                    "prompt": "best month?",
                    "selected_data": [{"Name": "Sales", "Columns": ["Amount"]}],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let answer = body_json(response).await["answer"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(
            answer.starts_with("Error communicating with OpenAI"),
            "unexpected answer: {answer}"
        );
    }
}
