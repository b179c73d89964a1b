//! Community REST API handlers.
//!
//! Every mutating endpoint goes through the engine's per-community
//! processor and returns the committed snapshot. Failures come back as
//! an [`ErrorPayload`] with an HTTP status derived from its kind.

use agora_core::{
    AppealDecision, CommunityChanges, Error, ErrorKind, ErrorPayload, ReportCategory,
    ReportOutcome, Visibility,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::state::RelayState;

// ── Request / Response Types ─────────────────────────────────────────────────

/// POST /api/communities
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommunityRequest {
    pub admin: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visibility: Visibility,
}

/// PATCH /api/communities/:id
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommunityRequest {
    pub requester: String,
    #[serde(flatten)]
    pub changes: CommunityChanges,
}

/// DELETE /api/communities/:id, join and leave.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub username: String,
}

/// POST /api/communities/:id/{moderators,bans,mutes}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub requester: String,
    pub target: String,
}

/// POST /api/communities/:id/appeals
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAppealRequest {
    pub username: String,
    pub description: String,
}

/// POST /api/appeals/:id/resolve
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAppealRequest {
    pub moderator: String,
    pub decision: AppealDecision,
}

/// POST /api/communities/:id/reports
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReportRequest {
    pub reporter: String,
    pub reported: String,
    pub reason: String,
    pub category: ReportCategory,
}

/// POST /api/reports/:id/review
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReportRequest {
    pub moderator: String,
    pub outcome: ReportOutcome,
}

/// Query string carrying the acting user for privileged reads.
#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub viewer: Option<String>,
}

/// Uniform response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Json<Self> {
        Json(Self {
            ok: true,
            data: Some(data),
            error: None,
        })
    }
}

/// HTTP status for an engine error.
fn status_for(err: &Error) -> StatusCode {
    match err.kind() {
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::InvariantRejection => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateState => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    if err.kind() == ErrorKind::Internal {
        tracing::error!(error = %err, "Engine error");
    }
    let status = status_for(&err);
    (
        status,
        Json(ApiResponse::<()> {
            ok: false,
            data: None,
            error: Some(ErrorPayload::from(err)),
        }),
    )
        .into_response()
}

fn respond<T: Serialize>(result: agora_core::Result<T>) -> Response {
    match result {
        Ok(data) => ApiResponse::success(data).into_response(),
        Err(err) => error_response(err),
    }
}

fn required(field: &str, viewer: Option<String>) -> agora_core::Result<String> {
    viewer
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("{} is required", field)))
}

// ── Router ───────────────────────────────────────────────────────────────────

/// All `/api` routes.
pub fn routes() -> Router<RelayState> {
    Router::new()
        .route(
            "/api/communities",
            post(create_community).get(list_communities),
        )
        .route(
            "/api/communities/:id",
            get(get_community)
                .patch(update_community)
                .delete(delete_community),
        )
        .route("/api/communities/:id/join", post(join_community))
        .route("/api/communities/:id/leave", post(leave_community))
        .route("/api/communities/:id/can-post/:username", get(can_post))
        .route("/api/communities/:id/moderators", post(toggle_moderator))
        .route("/api/communities/:id/bans", post(toggle_ban))
        .route("/api/communities/:id/mutes", post(toggle_mute))
        .route(
            "/api/communities/:id/appeals",
            post(submit_appeal).get(list_appeals),
        )
        .route("/api/users/:username/appeals", get(appeals_for))
        .route("/api/appeals/:id", get(get_appeal))
        .route("/api/appeals/:id/resolve", post(resolve_appeal))
        .route(
            "/api/communities/:id/reports",
            post(file_report).get(list_reports),
        )
        .route("/api/reports/:id", get(get_report))
        .route("/api/reports/:id/review", post(review_report))
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

/// POST /api/communities
async fn create_community(
    State(state): State<RelayState>,
    Json(req): Json<CreateCommunityRequest>,
) -> Response {
    match state
        .engine
        .create_community(&req.admin, &req.name, &req.description, req.visibility)
    {
        Ok(community) => (StatusCode::CREATED, ApiResponse::success(community)).into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/communities?viewer=
async fn list_communities(
    State(state): State<RelayState>,
    Query(query): Query<ViewerQuery>,
) -> Response {
    let communities = state.engine.list_communities(query.viewer.as_deref());
    ApiResponse::success(communities).into_response()
}

/// GET /api/communities/:id?viewer=
///
/// Private communities answer 404 to non-members.
async fn get_community(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Response {
    respond(state.engine.get_community(&id).and_then(|community| {
        if community.is_visible_to(query.viewer.as_deref()) {
            Ok(community)
        } else {
            Err(Error::CommunityNotFound)
        }
    }))
}

/// PATCH /api/communities/:id
async fn update_community(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCommunityRequest>,
) -> Response {
    respond(
        state
            .engine
            .update_community(&id, &req.requester, req.changes)
            .await,
    )
}

/// DELETE /api/communities/:id
async fn delete_community(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<UserRequest>,
) -> Response {
    respond(state.engine.delete_community(&id, &req.username).await)
}

// ── Membership ───────────────────────────────────────────────────────────────

async fn join_community(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<UserRequest>,
) -> Response {
    respond(state.engine.join_community(&id, &req.username).await)
}

async fn leave_community(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<UserRequest>,
) -> Response {
    respond(state.engine.leave_community(&id, &req.username).await)
}

/// GET /api/communities/:id/can-post/:username
async fn can_post(
    State(state): State<RelayState>,
    Path((id, username)): Path<(String, String)>,
) -> Response {
    respond(state.engine.can_post(&id, &username))
}

// ── Moderation ───────────────────────────────────────────────────────────────

async fn toggle_moderator(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> Response {
    respond(
        state
            .engine
            .toggle_moderator(&id, &req.requester, &req.target)
            .await,
    )
}

async fn toggle_ban(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> Response {
    respond(
        state
            .engine
            .toggle_ban(&id, &req.requester, &req.target)
            .await,
    )
}

async fn toggle_mute(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> Response {
    respond(
        state
            .engine
            .toggle_mute(&id, &req.requester, &req.target)
            .await,
    )
}

// ── Appeals ──────────────────────────────────────────────────────────────────

async fn submit_appeal(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitAppealRequest>,
) -> Response {
    match state
        .engine
        .submit_appeal(&id, &req.username, &req.description)
    {
        Ok(appeal) => (StatusCode::CREATED, ApiResponse::success(appeal)).into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/communities/:id/appeals?viewer=
async fn list_appeals(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Response {
    respond(
        required("viewer", query.viewer)
            .and_then(|viewer| state.engine.list_appeals(&id, &viewer)),
    )
}

/// GET /api/users/:username/appeals
async fn appeals_for(
    State(state): State<RelayState>,
    Path(username): Path<String>,
) -> Response {
    ApiResponse::success(state.engine.appeals_for(&username)).into_response()
}

async fn get_appeal(State(state): State<RelayState>, Path(id): Path<String>) -> Response {
    respond(state.engine.get_appeal(&id))
}

async fn resolve_appeal(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<ResolveAppealRequest>,
) -> Response {
    respond(
        state
            .engine
            .resolve_appeal(&id, req.decision, &req.moderator)
            .await,
    )
}

// ── Reports ──────────────────────────────────────────────────────────────────

async fn file_report(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<FileReportRequest>,
) -> Response {
    match state
        .engine
        .file_report(&id, &req.reporter, &req.reported, &req.reason, req.category)
        .await
    {
        Ok(report) => (StatusCode::CREATED, ApiResponse::success(report)).into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/communities/:id/reports?viewer=
async fn list_reports(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Response {
    respond(
        required("viewer", query.viewer)
            .and_then(|viewer| state.engine.list_reports(&id, &viewer)),
    )
}

async fn get_report(State(state): State<RelayState>, Path(id): Path<String>) -> Response {
    respond(state.engine.get_report(&id))
}

async fn review_report(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    Json(req): Json<ReviewReportRequest>,
) -> Response {
    respond(
        state
            .engine
            .review_report(&id, &req.moderator, req.outcome),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::RejectionReason;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::state::RelayConfig;

    fn app() -> (Router, RelayState) {
        let state = RelayState::new(RelayConfig::default());
        (routes().with_state(state.clone()), state)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn create(app: &Router) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/communities",
            Some(json!({"admin": "alice", "name": "Rust"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::Unauthorized("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&Error::Rejected(RejectionReason::TargetIsAdmin)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&Error::AppealNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::DuplicateOpenReport), StatusCode::CONFLICT);
        assert_eq!(status_for(&Error::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Error::ProcessorUnavailable),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_create_join_and_ban() {
        let (app, _) = app();
        let id = create(&app).await;

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/communities/{}/join", id),
            Some(json!({"username": "bob"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["version"], 2);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/communities/{}/bans", id),
            Some(json!({"requester": "alice", "target": "bob"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["banned"], json!(["bob"]));

        let (_, body) = call(
            &app,
            Method::GET,
            &format!("/api/communities/{}/can-post/bob", id),
            None,
        )
        .await;
        assert_eq!(body["data"], false);
    }

    #[tokio::test]
    async fn test_rejections_carry_codes() {
        let (app, _) = app();
        let id = create(&app).await;

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/communities/{}/bans", id),
            Some(json!({"requester": "alice", "target": "alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], 200);
        assert_eq!(body["error"]["kind"], "INVARIANT_REJECTION");

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/api/communities/{}/moderators", id),
            Some(json!({"requester": "mallory", "target": "alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, Method::GET, "/api/communities/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Community not found.");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (app, state) = app();
        let id = create(&app).await;

        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/api/communities/{}", id),
            Some(json!({"requester": "alice", "name": "Rustaceans"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Rustaceans");

        let (status, _) = call(
            &app,
            Method::DELETE,
            &format!("/api/communities/{}", id),
            Some(json!({"username": "alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.engine.community_count(), 0);
    }

    #[tokio::test]
    async fn test_appeal_flow() {
        let (app, _) = app();
        let id = create(&app).await;
        call(
            &app,
            Method::POST,
            &format!("/api/communities/{}/join", id),
            Some(json!({"username": "bob"})),
        )
        .await;
        call(
            &app,
            Method::POST,
            &format!("/api/communities/{}/mutes", id),
            Some(json!({"requester": "alice", "target": "bob"})),
        )
        .await;

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/communities/{}/appeals", id),
            Some(json!({"username": "bob", "description": "sorry"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let appeal_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/api/communities/{}/appeals", id),
            Some(json!({"username": "bob", "description": "again"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            Method::GET,
            &format!("/api/communities/{}/appeals", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/appeals/{}/resolve", appeal_id),
            Some(json!({"moderator": "alice", "decision": "APPROVED"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "APPROVED");

        let (_, body) = call(
            &app,
            Method::GET,
            &format!("/api/communities/{}/can-post/bob", id),
            None,
        )
        .await;
        assert_eq!(body["data"], true);
    }

    #[tokio::test]
    async fn test_report_and_review() {
        let (app, _) = app();
        let id = create(&app).await;
        for user in ["bob", "carol"] {
            call(
                &app,
                Method::POST,
                &format!("/api/communities/{}/join", id),
                Some(json!({"username": user})),
            )
            .await;
        }

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/communities/{}/reports", id),
            Some(json!({
                "reporter": "bob",
                "reported": "carol",
                "reason": "spam links",
                "category": "SPAM"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let report_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            Method::GET,
            &format!("/api/communities/{}/reports?viewer=alice", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/reports/{}/review", report_id),
            Some(json!({"moderator": "alice", "outcome": "DISMISSED"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "DISMISSED");
    }

    #[tokio::test]
    async fn test_private_community_hidden() {
        let (app, _) = app();
        let (_, body) = call(
            &app,
            Method::POST,
            "/api/communities",
            Some(json!({"admin": "alice", "name": "Secret", "visibility": "PRIVATE"})),
        )
        .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (_, body) = call(&app, Method::GET, "/api/communities", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);

        let (status, _) = call(&app, Method::GET, &format!("/api/communities/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            Method::GET,
            &format!("/api/communities/{}?viewer=alice", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
