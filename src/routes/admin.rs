use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::error::AppError;
use crate::invites::{CodeStats, CodeStatus, ImportSummary, Tenant};
use crate::models::{AddCodeRequest, ClearCodesResponse, RecordUsageRequest};
use crate::routes::require_admin;
use crate::state::AppState;

/// GET /api/admin/{tenant}/codes
pub async fn list_codes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant): Path<Tenant>,
) -> Result<Json<Vec<CodeStatus>>, AppError> {
    require_admin(&state, &headers, tenant)?;
    Ok(Json(state.invite_store(tenant).list_codes().await?))
}

/// POST /api/admin/{tenant}/codes
pub async fn add_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant): Path<Tenant>,
    Json(req): Json<AddCodeRequest>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers, tenant)?;
    state.invite_store(tenant).add_code(&req.code).await?;
    state.stats_cache.invalidate(&tenant);
    Ok(StatusCode::CREATED)
}

/// POST /api/admin/{tenant}/codes/upload: raw `code,consumer_player` CSV body
pub async fn upload_codes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant): Path<Tenant>,
    body: String,
) -> Result<Json<ImportSummary>, AppError> {
    require_admin(&state, &headers, tenant)?;
    let summary = state.invite_store(tenant).import_csv(&body).await?;
    state.stats_cache.invalidate(&tenant);
    Ok(Json(summary))
}

/// DELETE /api/admin/{tenant}/codes
pub async fn clear_codes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant): Path<Tenant>,
) -> Result<Json<ClearCodesResponse>, AppError> {
    require_admin(&state, &headers, tenant)?;
    let removed = state.invite_store(tenant).clear_all().await?;
    state.stats_cache.invalidate(&tenant);
    Ok(Json(ClearCodesResponse { removed }))
}

/// DELETE /api/admin/{tenant}/codes/{code}
pub async fn delete_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((tenant, code)): Path<(Tenant, String)>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers, tenant)?;
    state.invite_store(tenant).delete_code(&code).await?;
    state.stats_cache.invalidate(&tenant);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/{tenant}/stats
pub async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant): Path<Tenant>,
) -> Result<Json<CodeStats>, AppError> {
    require_admin(&state, &headers, tenant)?;
    if let Some(stats) = state.stats_cache.get(&tenant) {
        return Ok(Json(stats));
    }
    let stats = state.invite_store(tenant).stats().await?;
    state.stats_cache.insert(tenant, stats.clone());
    Ok(Json(stats))
}

/// POST /api/admin/{tenant}/usage: mark a code as redeemed in game
pub async fn record_usage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant): Path<Tenant>,
    Json(req): Json<RecordUsageRequest>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers, tenant)?;
    let code = req.invite_code.trim();
    if code.is_empty() {
        return Err(AppError::validation("invite_code is required"));
    }
    let player = req
        .player_name
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    state.invite_store(tenant).record_usage(code, player).await?;
    state.stats_cache.invalidate(&tenant);
    Ok(StatusCode::NO_CONTENT)
}
