use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    models::{PatientDetails, UploadScanRequest, WorkflowSnapshot},
    workflow::{ScanWorkflow, WorkflowError},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Request body cap for scan uploads. Base64 inflates a file by a third, so
/// this admits images of roughly 15 MB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn conflict_error(message: &str, phase: &Value) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": message,
            "phase": phase
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn workflow_error(err: WorkflowError) -> ApiError {
    match err {
        WorkflowError::SessionNotFound(id) => not_found_error("Session not found", &id),
        WorkflowError::InvalidTransition { phase, .. } => {
            warn!("{}", err);
            conflict_error(&err.to_string(), &json!(phase))
        }
        WorkflowError::InvalidPatient {
            ref missing,
            ref malformed,
        } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Patient details are incomplete or invalid",
                "missing_fields": missing,
                "malformed_fields": malformed
            })),
        ),
        WorkflowError::Capture(ref message) => bad_request_error(message),
        WorkflowError::Flow(e) => {
            error!("Workflow engine failure: {}", e);
            internal_error("Workflow engine failure", &e.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub workflow: ScanWorkflow,
}

pub fn create_app(workflow: ScanWorkflow, max_upload_bytes: usize) -> Router {
    build_router(AppState { workflow }, max_upload_bytes)
}

fn build_router(app_state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/dgp/sessions", post(create_session))
        .route("/dgp/{session_id}", get(get_session))
        .route("/dgp/{session_id}/patient", post(submit_patient))
        .route("/dgp/{session_id}/scan/press", post(press_scan))
        .route("/dgp/{session_id}/scan/release", post(release_scan))
        .route(
            "/dgp/{session_id}/scan/upload",
            post(upload_scan).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/dgp/{session_id}/back", post(go_back))
        .route("/dgp/{session_id}/reset", post(reset_session))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Tags every request with a fresh correlation id and runs it inside a span
/// carrying that id
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = header.clone() {
        request.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "DGP Blood Group Report Service",
        "version": "0.1.0",
        "description": "Simulated fingerprint capture with AI-generated dermatoglyphic blood-group reports",
        "endpoints": {
            "POST /dgp/sessions": "Start a new patient session",
            "GET /dgp/{session_id}": "Get phase, patient, scan progress and report",
            "POST /dgp/{session_id}/patient": "Submit patient details",
            "POST /dgp/{session_id}/scan/press": "Press and hold the sensor pad",
            "POST /dgp/{session_id}/scan/release": "Release the sensor pad",
            "POST /dgp/{session_id}/scan/upload": "Upload a scan instead of holding",
            "POST /dgp/{session_id}/back": "Return to patient details",
            "POST /dgp/{session_id}/reset": "Start over with a new patient",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_session(State(state): State<AppState>) -> ApiResult<WorkflowSnapshot> {
    let session_id = state.workflow.start_session().await.map_err(workflow_error)?;
    info!(session_id = %session_id, "New DGP session");

    let snapshot = state
        .workflow
        .snapshot(&session_id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(snapshot))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<WorkflowSnapshot> {
    let snapshot = state
        .workflow
        .snapshot(&session_id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(snapshot))
}

async fn submit_patient(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(patient): Json<PatientDetails>,
) -> ApiResult<WorkflowSnapshot> {
    info!(session_id = %session_id, "Patient details received");

    let snapshot = state
        .workflow
        .submit_patient(&session_id, patient)
        .await
        .map_err(workflow_error)?;
    Ok(Json(snapshot))
}

async fn press_scan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<WorkflowSnapshot> {
    let snapshot = state
        .workflow
        .press(&session_id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(snapshot))
}

async fn release_scan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<WorkflowSnapshot> {
    let snapshot = state
        .workflow
        .release(&session_id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(snapshot))
}

async fn upload_scan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UploadScanRequest>,
) -> ApiResult<WorkflowSnapshot> {
    let bytes = request.decode().map_err(|e| {
        warn!(session_id = %session_id, "Rejected upload: {}", e);
        bad_request_error("Uploaded scan is not valid base64")
    })?;

    let snapshot = state
        .workflow
        .upload(&session_id, bytes)
        .await
        .map_err(workflow_error)?;
    Ok(Json(snapshot))
}

async fn go_back(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<WorkflowSnapshot> {
    let snapshot = state
        .workflow
        .back(&session_id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(snapshot))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<WorkflowSnapshot> {
    let snapshot = state
        .workflow
        .reset(&session_id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(snapshot))
}
