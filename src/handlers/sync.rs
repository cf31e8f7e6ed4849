use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{self, Capability, CredentialPolicy};
use crate::errors::ServiceError;
use crate::sync::{ChangeSet, PushFailure, PushRequest};
use crate::AppState;

/// Query parameters shared by both protocol versions. `schemaVersion` and
/// `migration` are accepted but not yet enforced; they are reserved for
/// compatibility gating of old mobile schema versions.
#[derive(Debug, Deserialize, IntoParams)]
pub struct SyncQuery {
    /// Client-held watermark, epoch milliseconds. Absent or 0 means a full
    /// first pull.
    pub last_pulled_at: Option<i64>,
    #[serde(rename = "schemaVersion")]
    pub schema_version: Option<i64>,
    pub migration: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PullResponse {
    pub success: bool,
    pub changes: ChangeSet,
    /// Server time at extraction, epoch milliseconds. The client stores this
    /// as its next watermark.
    pub timestamp: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PushResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<PushFailure>,
    pub timestamp: i64,
}

/// Both protocol versions are served indefinitely: fielded mobile clients
/// cannot be force-upgraded. v1 (and its legacy path alias) authenticates
/// with Basic credentials only; v2 also accepts Bearer tokens.
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sync", get(pull_legacy).post(push_legacy))
        .route("/v1/api/sync", get(pull_legacy).post(push_legacy))
        .route("/api/v2/sync", get(pull_v2).post(push_v2))
}

#[utoipa::path(
    get,
    path = "/api/v2/sync",
    params(SyncQuery),
    responses(
        (status = 200, description = "Change set since the watermark", body = PullResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "sync"
)]
pub async fn pull_v2(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
    headers: HeaderMap,
) -> Result<Json<PullResponse>, ServiceError> {
    pull(state, query, headers, CredentialPolicy::TokenOrBasic).await
}

async fn pull_legacy(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
    headers: HeaderMap,
) -> Result<Json<PullResponse>, ServiceError> {
    pull(state, query, headers, CredentialPolicy::BasicOnly).await
}

#[utoipa::path(
    post,
    path = "/api/v2/sync",
    request_body = PushRequest,
    responses(
        (status = 200, description = "Push applied (possibly partially)", body = PushResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "sync"
)]
pub async fn push_v2(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
    headers: HeaderMap,
    Json(body): Json<PushRequest>,
) -> Result<Json<PushResponse>, ServiceError> {
    push(state, query, headers, body, CredentialPolicy::TokenOrBasic).await
}

async fn push_legacy(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
    headers: HeaderMap,
    Json(body): Json<PushRequest>,
) -> Result<Json<PushResponse>, ServiceError> {
    push(state, query, headers, body, CredentialPolicy::BasicOnly).await
}

async fn pull(
    state: AppState,
    query: SyncQuery,
    headers: HeaderMap,
    policy: CredentialPolicy,
) -> Result<Json<PullResponse>, ServiceError> {
    let user = auth::authenticate_request(&state.db, &state.config, &headers, policy).await?;
    auth::require_any_clinic_capability(&state.db, &user, Capability::Sync).await?;

    log_reserved_params(&query);
    let since = watermark(&query);

    let changes = state.services.sync.pull(since, user.id).await?;

    Ok(Json(PullResponse {
        success: true,
        changes,
        timestamp: Utc::now().timestamp_millis(),
    }))
}

async fn push(
    state: AppState,
    query: SyncQuery,
    headers: HeaderMap,
    body: PushRequest,
    policy: CredentialPolicy,
) -> Result<Json<PushResponse>, ServiceError> {
    let user = auth::authenticate_request(&state.db, &state.config, &headers, policy).await?;
    auth::require_any_clinic_capability(&state.db, &user, Capability::Sync).await?;

    log_reserved_params(&query);

    let report = state.services.sync.push(body, user.id).await?;

    Ok(Json(PushResponse {
        success: report.is_success(),
        failed: report.failed,
        timestamp: Utc::now().timestamp_millis(),
    }))
}

fn watermark(query: &SyncQuery) -> Option<DateTime<Utc>> {
    query
        .last_pulled_at
        .filter(|ms| *ms > 0)
        .and_then(DateTime::from_timestamp_millis)
}

fn log_reserved_params(query: &SyncQuery) {
    if query.schema_version.is_some() || query.migration.is_some() {
        debug!(
            schema_version = ?query.schema_version,
            migration = ?query.migration,
            "sync versioning params received (not yet enforced)"
        );
    }
}
