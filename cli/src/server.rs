use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::auth;
use doze_core::csv_import::{export_csv, import_csv};
use doze_core::db::Database;
use doze_core::models::{ImportOutcome, SleepLog, SleepLogDraft, User};
use doze_core::stats::{compute_statistics, compute_weekly};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
}

/// The authenticated account, attached to the request by `require_auth`.
#[derive(Clone)]
struct CurrentUser {
    id: i64,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct ListQuery {
    month: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
    target_user_id: Option<i64>,
}

#[derive(Deserialize)]
struct ViewQuery {
    target_user_id: Option<i64>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                eprintln!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let user = token.and_then(|token| {
        let db = state
            .db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = chrono::Utc::now().to_rfc3339();
        db.get_session_user(&token, &now).ok().flatten()
    });

    match user {
        Some(user) => {
            request.extensions_mut().insert(CurrentUser { id: user.id });
            next.run(request).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid or missing session token".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Auth handlers ---

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let username = req.username.trim().to_string();
    if username.len() < 3 {
        return Err(ApiError::BadRequest(
            "username must be at least 3 characters".to_string(),
        ));
    }
    if req.password.len() < 6 {
        return Err(ApiError::BadRequest(
            "password must be at least 6 characters".to_string(),
        ));
    }

    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if db
        .get_user_by_username(&username)
        .context("database error")?
        .is_some()
    {
        return Err(ApiError::Conflict("username is already taken".to_string()));
    }
    let user = db
        .create_user(&username, &auth::hash_password(&req.password))
        .context("failed to create user")?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    let user = db
        .get_user_by_username(req.username.trim())
        .context("database error")?
        .filter(|u| !u.password_hash.is_empty())
        .filter(|u| u.password_hash == auth::hash_password(&req.password))
        .ok_or_else(|| ApiError::Unauthorized("invalid username or password".to_string()))?;

    let token = auth::generate_token();
    db.create_session(&token, user.id, &auth::session_expiry())
        .context("failed to create session")?;

    Ok(Json(serde_json::json!({
        "token": token,
        "user": { "id": user.id, "username": user.username },
    })))
}

// --- View helper ---

/// Resolve which user's records a read request may see. Viewing another
/// account is allowed only when that account is flagged public.
fn resolve_view_user(
    db: &Database,
    requester: &CurrentUser,
    target: Option<i64>,
) -> Result<i64, ApiError> {
    match target {
        None => Ok(requester.id),
        Some(id) if id == requester.id => Ok(requester.id),
        Some(id) => {
            let user = db
                .get_user_by_id(id)
                .context("database error")?
                .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))?;
            if user.is_public {
                Ok(id)
            } else {
                Err(ApiError::Forbidden("user data is not public".to_string()))
            }
        }
    }
}

// --- Sleep log handlers ---

async fn create_log(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(draft): Json<SleepLogDraft>,
) -> Result<(StatusCode, Json<SleepLog>), ApiError> {
    let log = draft
        .into_validated()
        .map_err(|violations| ApiError::BadRequest(violations.join(", ")))?;

    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if db
        .find_log_id_by_date(user.id, &log.sleep_date, None)
        .context("database error")?
        .is_some()
    {
        return Err(ApiError::Conflict(format!(
            "a record for {} already exists",
            log.sleep_date
        )));
    }

    let created = db
        .insert_sleep_log(user.id, &log)
        .context("failed to insert sleep log")?;
    Ok((StatusCode::CREATED, Json(created)))
}

fn is_month(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 7
        && b.iter().enumerate().all(|(i, c)| match i {
            4 => *c == b'-',
            _ => c.is_ascii_digit(),
        })
}

async fn list_logs(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let view_user = resolve_view_user(&db, &user, params.target_user_id)?;

    if let Some(month) = params.month {
        if !is_month(&month) {
            return Err(ApiError::BadRequest(format!(
                "invalid month '{month}'. Use YYYY-MM"
            )));
        }
        let logs = db
            .list_logs_for_month(view_user, &month)
            .context("database error")?;
        let total = logs.len();
        return Ok(Json(serde_json::json!({
            "data": logs,
            "meta": { "month": month, "total": total },
        })));
    }

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let offset = (page - 1) * limit;

    let logs = db
        .list_logs_page(view_user, limit, offset)
        .context("database error")?;
    let total = db.count_logs(view_user).context("database error")?;

    Ok(Json(serde_json::json!({
        "data": logs,
        "meta": {
            "total": total,
            "page": page,
            "limit": limit,
            "total_pages": (total as u64).div_ceil(limit as u64),
        },
    })))
}

async fn get_log(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Query(params): Query<ViewQuery>,
) -> Result<Json<SleepLog>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let view_user = resolve_view_user(&db, &user, params.target_user_id)?;
    let log = db
        .get_sleep_log(view_user, id)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound(format!("Sleep log {id} not found")))?;
    Ok(Json(log))
}

async fn update_log(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(draft): Json<SleepLogDraft>,
) -> Result<Json<SleepLog>, ApiError> {
    let log = draft
        .into_validated()
        .map_err(|violations| ApiError::BadRequest(violations.join(", ")))?;

    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if db
        .find_log_id_by_date(user.id, &log.sleep_date, Some(id))
        .context("database error")?
        .is_some()
    {
        return Err(ApiError::Conflict(format!(
            "a record for {} already exists",
            log.sleep_date
        )));
    }

    if !db
        .update_sleep_log(user.id, id, &log)
        .context("failed to update sleep log")?
    {
        return Err(ApiError::NotFound(format!("Sleep log {id} not found")));
    }
    let updated = db
        .get_sleep_log(user.id, id)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound(format!("Sleep log {id} not found")))?;
    Ok(Json(updated))
}

async fn delete_log(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if db
        .delete_sleep_log(user.id, id)
        .context("database error")?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Sleep log {id} not found")))
    }
}

// --- Dashboard handlers ---

async fn statistics(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ViewQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let view_user = resolve_view_user(&db, &user, params.target_user_id)?;
    let logs = db.list_logs_ordered(view_user).context("database error")?;
    Ok(Json(serde_json::json!({ "data": compute_statistics(&logs) })))
}

async fn weekly(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ViewQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let view_user = resolve_view_user(&db, &user, params.target_user_id)?;
    let logs = db.list_logs_ordered(view_user).context("database error")?;
    Ok(Json(serde_json::json!({ "data": compute_weekly(&logs) })))
}

// --- CSV handlers ---

async fn export_logs(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<([(header::HeaderName, String); 2], String), ApiError> {
    let logs = {
        let db = state
            .db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        db.list_logs_ordered(user.id).context("database error")?
    };
    let csv = export_csv(&logs).context("failed to render CSV")?;
    let today = chrono::Local::now().format("%Y-%m-%d");
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "text/csv; charset=utf-8".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"sleep_logs_{today}.csv\""),
            ),
        ],
        csv,
    ))
}

/// Accepts either a raw CSV body or a multipart form with a `file` field.
async fn import_logs(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    request: Request,
) -> Result<Json<ImportOutcome>, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let text = if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|_| ApiError::BadRequest("invalid multipart body".to_string()))?;
        let mut csv_text = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
        {
            if field.name() == Some("file") {
                csv_text = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("failed to read uploaded file: {e}"))
                })?);
                break;
            }
        }
        csv_text.ok_or_else(|| {
            ApiError::BadRequest("no 'file' field found in form data".to_string())
        })?
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), BODY_LIMIT)
            .await
            .map_err(|_| ApiError::BadRequest("failed to read request body".to_string()))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ApiError::BadRequest("CSV body is not valid UTF-8".to_string()))?
    };

    if text.trim().is_empty() {
        return Err(ApiError::BadRequest("CSV input is empty".to_string()));
    }

    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let outcome = import_csv(&db, user.id, &text).context("import failed")?;
    Ok(Json(outcome))
}

// --- User handlers ---

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let users = db.list_users().context("database error")?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    let db = state
        .db
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let user = db
        .get_user_by_id(id)
        .context("database error")?
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))?;
    Ok(Json(user))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/sleep_logs", post(create_log).get(list_logs))
        .route(
            "/api/sleep_logs/{id}",
            get(get_log).put(update_log).delete(delete_log),
        )
        .route("/api/dashboard/statistics", get(statistics))
        .route("/api/dashboard/weekly", get(weekly))
        .route("/api/csv/export", get(export_logs))
        .route("/api/csv/import", post(import_logs))
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", get(get_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(db: Database, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!("Warning: listening on {bind}. Any device on your network can reach this API.");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let state = AppState {
            db: Arc::new(Mutex::new(Database::open_in_memory().unwrap())),
        };
        build_router(state)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    async fn signup_and_login(app: &Router, username: &str) -> String {
        let creds = serde_json::json!({ "username": username, "password": "secret123" });
        let (status, _) = send(app, "POST", "/api/auth/signup", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(app, "POST", "/api/auth/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    fn sample_log(date: &str) -> serde_json::Value {
        serde_json::json!({
            "sleep_date": date,
            "sleep_score": 85,
            "bed_time": "23:30",
            "wakeup_time": "07:00",
            "sleep_duration": 450,
            "wakeup_count": 1,
            "deep_sleep_continuity": 90,
            "deep_sleep_percentage": 50,
            "light_sleep_percentage": 30,
            "rem_sleep_percentage": 20,
        })
    }

    #[tokio::test]
    async fn missing_token_returns_401() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/api/sleep_logs", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or missing session token");
    }

    #[tokio::test]
    async fn bogus_token_returns_401() {
        let app = test_app();
        let (status, _) = send(&app, "GET", "/api/sleep_logs", Some("nope"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_rejects_weak_credentials() {
        let app = test_app();
        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/signup",
            None,
            Some(serde_json::json!({ "username": "ab", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/signup",
            None,
            Some(serde_json::json!({ "username": "alice", "password": "short" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_duplicate_username_conflicts() {
        let app = test_app();
        let creds = serde_json::json!({ "username": "alice", "password": "secret123" });
        let (status, _) = send(&app, "POST", "/api/auth/signup", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, "POST", "/api/auth/signup", None, Some(creds)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn login_wrong_password_returns_401() {
        let app = test_app();
        signup_and_login(&app, "alice").await;
        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(serde_json::json!({ "username": "alice", "password": "wrong-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_log_and_duplicate_date_conflict() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/sleep_logs",
            Some(&token),
            Some(sample_log("2024-01-01")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["sleep_date"], "2024-01-01");
        assert_eq!(body["sleep_duration"], 450);

        let (status, _) = send(
            &app,
            "POST",
            "/api/sleep_logs",
            Some(&token),
            Some(sample_log("2024-01-01")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_log_validation_failure_lists_fields() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;

        let mut log = sample_log("2024-01-01");
        log["rem_sleep_percentage"] = serde_json::json!(19); // sum 99
        let (status, body) = send(&app, "POST", "/api/sleep_logs", Some(&token), Some(log)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .contains("sum to exactly 100")
        );
    }

    #[tokio::test]
    async fn list_logs_paginates_newest_first() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        for day in 1..=3 {
            let (status, _) = send(
                &app,
                "POST",
                "/api/sleep_logs",
                Some(&token),
                Some(sample_log(&format!("2024-01-0{day}"))),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(
            &app,
            "GET",
            "/api/sleep_logs?page=1&limit=2",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["sleep_date"], "2024-01-03");
        assert_eq!(body["meta"]["total"], 3);
        assert_eq!(body["meta"]["total_pages"], 2);
    }

    #[tokio::test]
    async fn list_logs_by_month() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        for date in ["2024-01-15", "2024-01-03", "2024-02-01"] {
            send(
                &app,
                "POST",
                "/api/sleep_logs",
                Some(&token),
                Some(sample_log(date)),
            )
            .await;
        }

        let (status, body) = send(
            &app,
            "GET",
            "/api/sleep_logs?month=2024-01",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 2);
        // Ascending within the month
        assert_eq!(body["data"][0]["sleep_date"], "2024-01-03");

        let (status, _) = send(
            &app,
            "GET",
            "/api/sleep_logs?month=January",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_log_replaces_and_conflicts() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        let (_, created) = send(
            &app,
            "POST",
            "/api/sleep_logs",
            Some(&token),
            Some(sample_log("2024-01-01")),
        )
        .await;
        send(
            &app,
            "POST",
            "/api/sleep_logs",
            Some(&token),
            Some(sample_log("2024-01-02")),
        )
        .await;
        let id = created["id"].as_i64().unwrap();

        // Full replace with a new score
        let mut replacement = sample_log("2024-01-01");
        replacement["sleep_score"] = serde_json::json!(42);
        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/sleep_logs/{id}"),
            Some(&token),
            Some(replacement),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sleep_score"], 42.0);

        // Moving onto another record's date conflicts
        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/sleep_logs/{id}"),
            Some(&token),
            Some(sample_log("2024-01-02")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Unknown id is a 404
        let (status, _) = send(
            &app,
            "PUT",
            "/api/sleep_logs/9999",
            Some(&token),
            Some(sample_log("2024-03-01")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_log_then_404() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        let (_, created) = send(
            &app,
            "POST",
            "/api/sleep_logs",
            Some(&token),
            Some(sample_log("2024-01-01")),
        )
        .await;
        let id = created["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/sleep_logs/{id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            &app,
            "GET",
            &format!("/api/sleep_logs/{id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn statistics_reports_no_data_as_null() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        let (status, body) = send(&app, "GET", "/api/dashboard/statistics", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn statistics_includes_trends_and_folded_bed_time() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        for date in ["2024-01-01", "2024-01-02"] {
            send(
                &app,
                "POST",
                "/api/sleep_logs",
                Some(&token),
                Some(sample_log(date)),
            )
            .await;
        }

        let (status, body) = send(&app, "GET", "/api/dashboard/statistics", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["count"], 2);
        assert_eq!(data["sleep_score"]["avg"], 85.0);
        // 23:30 = 1410 folded minutes
        assert_eq!(data["avg_bed_time_min"], 1410.0);
        assert_eq!(data["trends"]["wakeup_count"], 0.0);
    }

    #[tokio::test]
    async fn weekly_groups_by_day_of_week() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        // Two Mondays and one Wednesday
        for date in ["2024-01-01", "2024-01-08", "2024-01-03"] {
            send(
                &app,
                "POST",
                "/api/sleep_logs",
                Some(&token),
                Some(sample_log(date)),
            )
            .await;
        }

        let (status, body) = send(&app, "GET", "/api/dashboard/weekly", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let groups = body["data"].as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["day_of_week"], 1);
        assert_eq!(groups[0]["count"], 2);
        assert_eq!(groups[1]["day_of_week"], 3);
    }

    #[tokio::test]
    async fn export_sets_csv_headers() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        send(
            &app,
            "POST",
            "/api/sleep_logs",
            Some(&token),
            Some(sample_log("2024-01-01")),
        )
        .await;

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::get("/api/csv/export")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/csv; charset=utf-8"
        );
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"sleep_logs_"));

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("日付,睡眠スコア"));
        assert!(text.contains("2024-01-01,85,23:30,07:00"));
    }

    #[tokio::test]
    async fn import_raw_body_returns_outcome() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;

        let csv = "日付,睡眠スコア,就寝時間,起床時間,中途覚醒回数,深い睡眠の持続性,睡眠時間(分),深い睡眠割合,浅い睡眠割合,レム睡眠割合\n\
                   2024-01-01,85,23:30,07:00,1,90,450,50,30,20\n\
                   2024-01-02,85,23:30,07:00,1,90,450,50,30,19\n";
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::post("/api/csv/import")
                    .header("Authorization", format!("Bearer {token}"))
                    .header("content-type", "text/csv")
                    .body(Body::from(csv))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["inserted"], 1);
        assert_eq!(body["errors"], 1);
        assert!(body["messages"][0].as_str().unwrap().starts_with("row 2:"));
    }

    #[tokio::test]
    async fn import_multipart_file_field() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;

        let csv = "2024-01-01,85,23:30,07:00,1,90,450,50,30,20\r\n";
        let boundary = "X-DOZE-TEST-BOUNDARY";
        let body = format!(
            "--{boundary}\r\ncontent-disposition: form-data; name=\"file\"; filename=\"sleep.csv\"\r\ncontent-type: text/csv\r\n\r\n{csv}\r\n--{boundary}--\r\n"
        );

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::post("/api/csv/import")
                    .header("Authorization", format!("Bearer {token}"))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let outcome: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(outcome["inserted"], 1);
    }

    #[tokio::test]
    async fn import_empty_body_is_rejected() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::post("/api/csv/import")
                    .header("Authorization", format!("Bearer {token}"))
                    .header("content-type", "text/csv")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn viewing_other_users_requires_public_flag() {
        let app = test_app();
        let alice = signup_and_login(&app, "alice").await;
        let bob = signup_and_login(&app, "bobby").await;
        send(
            &app,
            "POST",
            "/api/sleep_logs",
            Some(&alice),
            Some(sample_log("2024-01-01")),
        )
        .await;

        // Alice is user id 1 and not public
        let (status, _) = send(
            &app,
            "GET",
            "/api/sleep_logs?target_user_id=1",
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn users_listing_hides_password_hash() {
        let app = test_app();
        let token = signup_and_login(&app, "alice").await;
        let (status, body) = send(&app, "GET", "/api/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let users = body.as_array().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["username"], "alice");
        assert!(users[0].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app();
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::get("/api/users")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }
}
