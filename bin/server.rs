// Rescue Desk - Web Server
// REST API with Axum over a single operator session

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use rescue_desk::logging::init_logging;
use rescue_desk::{
    build_link, export_filename, AppConfig, EnrichmentStatus, FilterCriteria, IntakeError,
    NewRequest, PageRequest, RecordStore, Session,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<Session>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::err(message))).into_response()
}

/// Run a session operation on the blocking pool (the AI adapter blocks).
async fn with_session<T, F>(state: &AppState, op: F) -> Result<T, Response>
where
    F: FnOnce(&mut Session) -> T + Send + 'static,
    T: Send + 'static,
{
    let session = state.session.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = session.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut guard)
    })
    .await
    .map_err(|e| {
        error!("Session worker failed: {}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "session worker failed")
    })
}

// ============================================================================
// Request types
// ============================================================================

fn criteria_from(
    priority: &Option<String>,
    region: &Option<String>,
    address: &Option<String>,
    phone: &Option<String>,
) -> Result<FilterCriteria, Response> {
    FilterCriteria::from_selection(
        priority.as_deref(),
        region.as_deref(),
        address.as_deref(),
        phone.as_deref(),
    )
    .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    priority: Option<String>,
    region: Option<String>,
    address: Option<String>,
    phone: Option<String>,
}

impl FilterQuery {
    fn criteria(&self) -> Result<FilterCriteria, Response> {
        criteria_from(&self.priority, &self.region, &self.address, &self.phone)
    }
}

// Filter fields repeated here: serde(flatten) breaks numeric query params
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    priority: Option<String>,
    region: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
    #[serde(default)]
    all: bool,
}

impl ListQuery {
    fn criteria(&self) -> Result<FilterCriteria, Response> {
        criteria_from(&self.priority, &self.region, &self.address, &self.phone)
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    address: String,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    original: String,
    improved: String,
    status: EnrichmentStatus,
    message: String,
}

#[derive(Debug, Deserialize)]
struct LinkQuery {
    #[serde(default)]
    address: String,
}

#[derive(Serialize)]
struct LinkResponse {
    url: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/requests - Filtered, paginated rescue requests
async fn list_requests(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    let criteria = match query.criteria() {
        Ok(criteria) => criteria,
        Err(response) => return response,
    };
    let page = PageRequest {
        page_size: if query.all {
            None
        } else {
            Some(query.page_size.unwrap_or(rescue_desk::filter::DEFAULT_PAGE_SIZE))
        },
        page: query.page.unwrap_or(1),
    };

    match with_session(&state, move |session| session.view(&criteria, page)).await {
        Ok(view) => (StatusCode::OK, Json(ApiResponse::ok(view))).into_response(),
        Err(response) => response,
    }
}

/// POST /api/requests - Add a rescue request (enriched synchronously)
async fn create_request(
    State(state): State<AppState>,
    payload: Result<Json<NewRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(
                rejection.status(),
                format!("Dữ liệu không hợp lệ: {}", rejection.body_text()),
            )
        }
    };

    match with_session(&state, move |session| session.submit(request)).await {
        Ok(Ok(outcome)) => (StatusCode::CREATED, Json(ApiResponse::ok(outcome))).into_response(),
        Ok(Err(IntakeError::MissingRequiredField(field))) => error_response(
            StatusCode::BAD_REQUEST,
            format!("Vui lòng điền đầy đủ các trường bắt buộc: {}", field),
        ),
        Ok(Err(e)) => {
            error!("Error saving rescue request: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to save rescue request")
        }
        Err(response) => response,
    }
}

/// GET /api/requests/export - CSV download of the filtered view
async fn export_requests(State(state): State<AppState>, Query(query): Query<FilterQuery>) -> Response {
    let criteria = match query.criteria() {
        Ok(criteria) => criteria,
        Err(response) => return response,
    };

    match with_session(&state, move |session| session.export(&criteria)).await {
        Ok(Ok(bytes)) => {
            let filename = export_filename(Local::now().naive_local());
            let headers = [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
            ];
            (StatusCode::OK, headers, bytes).into_response()
        }
        Ok(Err(e)) => {
            error!("Error exporting rescue requests: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "export failed")
        }
        Err(response) => response,
    }
}

/// GET /api/filters - Dropdown values for the filter bar
async fn get_filter_options(State(state): State<AppState>) -> Response {
    match with_session(&state, |session| session.filter_options()).await {
        Ok(options) => (StatusCode::OK, Json(ApiResponse::ok(options))).into_response(),
        Err(response) => response,
    }
}

/// GET /api/stats - Totals, urgent count, top regions
async fn get_stats(State(state): State<AppState>) -> Response {
    match with_session(&state, |session| session.stats()).await {
        Ok(stats) => (StatusCode::OK, Json(ApiResponse::ok(stats))).into_response(),
        Err(response) => response,
    }
}

/// POST /api/analyze - Clean up an address without saving
async fn analyze_address(State(state): State<AppState>, Json(body): Json<AnalyzeBody>) -> Response {
    let original = body.address.trim().to_string();

    match with_session(&state, move |session| session.analyze_address(&body.address)).await {
        Ok(Ok((improved, status))) => {
            let message = match &status {
                EnrichmentStatus::Success => "Phân tích thành công".to_string(),
                EnrichmentStatus::Skipped => "Chưa cấu hình Gemini API key".to_string(),
                EnrichmentStatus::Failed(err) => err.to_string(),
                _ => "Không thể cải thiện địa chỉ. Sử dụng địa chỉ gốc.".to_string(),
            };
            let response = AnalyzeResponse {
                original,
                improved,
                status,
                message,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(response) => response,
    }
}

/// GET /api/maps-link?address=... - Google Maps link for an address
async fn maps_link(Query(query): Query<LinkQuery>) -> impl IntoResponse {
    Json(ApiResponse::ok(LinkResponse {
        url: build_link(&query.address),
    }))
}

// ============================================================================
// Main Server
// ============================================================================

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/requests", get(list_requests).post(create_request))
        .route("/requests/export", get(export_requests))
        .route("/filters", get(get_filter_options))
        .route("/stats", get(get_stats))
        .route("/analyze", post(analyze_address))
        .route("/maps-link", get(maps_link))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Server running on http://{}", addr);
    info!("API: http://{}/api/requests", addr);

    axum::serve(listener, app(state))
        .await
        .context("Server stopped with an error")
}

fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_logging(config.log_json);

    // The blocking AI client must be built outside the async runtime
    let ai = config.build_collaborator()?;
    let session = Session::open(RecordStore::new(config.data_file.clone()), ai, config.enrichment)?;
    info!(path = %config.data_file.display(), "data file");

    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };
    // Keeps the session (and its blocking client) alive until the runtime is gone
    let _session_owner = state.session.clone();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(serve(state, &config.bind_addr));
    drop(runtime);

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rescue_desk::{Priority, RescueRequest};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(rows: &[RescueRequest]) -> (AppState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("data.csv"));
        let table = rows
            .iter()
            .cloned()
            .fold(rescue_desk::Table::new(), |table, row| table.append(row));
        store.save(&table).unwrap();

        let session = Session::open(store, None, rescue_desk::EnrichmentOptions::default()).unwrap();
        let state = AppState {
            session: Arc::new(Mutex::new(session)),
        };
        (state, dir)
    }

    fn sample_rows() -> Vec<RescueRequest> {
        vec![
            RescueRequest::new(Priority::Urgent, "Diên Khánh", "5", "12.2388,109.1967", "0912345678"),
            RescueRequest::new(Priority::High, "Diên Phú", "Nhiều", "Gần nhà thờ Hà Dừa", "0901234567"),
            RescueRequest::new(Priority::Urgent, "Diên Phú", "2", "Thôn Phú Ân Nam", "0988000111"),
        ]
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir) = test_state(&[]);
        let (status, body) = send(state, get("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_list_with_filters_and_pages() {
        let (state, _dir) = test_state(&sample_rows());

        let uri = "/api/requests?priority=Kh%E1%BA%A9n%20c%E1%BA%A5p&page_size=1&page=2";
        let (status, body) = send(state.clone(), get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 2);
        assert_eq!(body["data"]["page_count"], 2);
        assert_eq!(body["data"]["rows"][0]["Địa chỉ"], "Thôn Phú Ân Nam");

        let (_, body) = send(state, get("/api/requests?all=true")).await;
        assert_eq!(body["data"]["rows"].as_array().unwrap().len(), 3);
        assert_eq!(
            body["data"]["rows"][0]["map_link"],
            "https://www.google.com/maps?q=12.2388,109.1967"
        );
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_priority() {
        let (state, _dir) = test_state(&sample_rows());
        let (status, body) = send(state, get("/api/requests?priority=abc")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_create_request() {
        let (state, dir) = test_state(&[]);
        let request = json!({
            "priority": "Khẩn cấp",
            "people_count": "5",
            "address": "12.2388,109.1967",
            "phone": "0912345678"
        });

        let (status, body) = send(state.clone(), post_json("/api/requests", request)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["record"]["Chi tiết khu vực"], "Khác");
        assert_eq!(body["data"]["map_link"], "https://www.google.com/maps?q=12.2388,109.1967");

        let reloaded = RecordStore::new(dir.path().join("data.csv")).load().unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn test_create_request_missing_phone() {
        let (state, _dir) = test_state(&[]);
        let request = json!({ "priority": "Cao", "address": "Thôn 1" });

        let (status, body) = send(state, post_json("/api/requests", request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("phone"));
    }

    #[tokio::test]
    async fn test_create_request_bad_priority_uses_envelope() {
        let (state, _dir) = test_state(&[]);

        let unknown = json!({ "priority": "Rất gấp", "address": "Thôn 1", "phone": "0901" });
        let (status, body) = send(state.clone(), post_json("/api/requests", unknown)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("priority"));

        let missing = json!({ "address": "Thôn 1", "phone": "0901" });
        let (status, body) = send(state.clone(), post_json("/api/requests", missing)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);

        let request = Request::builder()
            .method("POST")
            .uri("/api/requests")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_export_is_csv_attachment() {
        let (state, _dir) = test_state(&sample_rows());
        let response = app(state)
            .oneshot(get("/api/requests/export?region=Di%C3%AAn%20Ph%C3%BA"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.contains("cuu_ho_filtered_"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let table = rescue_desk::store::decode_csv(&bytes).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_filters_and_link() {
        let (state, _dir) = test_state(&sample_rows());

        let (_, body) = send(state.clone(), get("/api/stats")).await;
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["urgent"], 2);

        let (_, body) = send(state.clone(), get("/api/filters")).await;
        assert_eq!(body["data"]["regions"], json!(["Tất cả", "Diên Khánh", "Diên Phú"]));

        let (_, body) = send(state, get("/api/maps-link?address=123%20Main%20St")).await;
        assert!(body["data"]["url"].as_str().unwrap().contains("%2C%20Vi%E1%BB%87t%20Nam"));
    }

    #[tokio::test]
    async fn test_analyze_without_ai_is_skipped() {
        let (state, _dir) = test_state(&[]);
        let (status, body) = send(state, post_json("/api/analyze", json!({ "address": "xã Diên An" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["improved"], "xã Diên An");
        assert_eq!(body["data"]["status"]["status"], "skipped");
    }
}
