use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};

use crate::error::AppError;
use crate::invites::{Assignment, AssignmentRecord, Tenant};
use crate::models::{
    normalize_wallet, parse_token_id, InviteCodeQuery, InviteCodeRequest, SuperpokerInviteRequest,
};
use crate::routes::require_bot_key;
use crate::state::AppState;

/// Validate the poker request and check the wallet holds the NFT.
/// Returns the canonical token id string used as the requester key.
async fn gate_poker_request(
    state: &AppState,
    req: &InviteCodeRequest,
) -> Result<(String, String), AppError> {
    let token_id = parse_token_id(&req.token_id)?;
    let wallet = normalize_wallet(&req.wallet_address)?;
    state.ownership.verify(token_id, &wallet).await?;
    Ok((token_id.to_string(), wallet))
}

fn found(state: &AppState, tenant: Tenant, assignment: Option<Assignment>) -> Result<Json<Assignment>, AppError> {
    let assignment = assignment.ok_or(AppError::NoCodesAvailable)?;
    if assignment.newly_assigned {
        state.stats_cache.invalidate(&tenant);
    }
    Ok(Json(assignment))
}

/// POST /api/invite-code: poker code for an NFT holder
pub async fn assign_poker_code(
    State(state): State<AppState>,
    Json(req): Json<InviteCodeRequest>,
) -> Result<Json<Assignment>, AppError> {
    let (token_id, wallet) = gate_poker_request(&state, &req).await?;
    let assignment = state.poker.assign(&token_id, Some(&wallet)).await?;
    found(&state, Tenant::Poker, assignment)
}

/// GET /api/invite-code?token_id=: existing poker assignment
pub async fn get_poker_code(
    State(state): State<AppState>,
    Query(query): Query<InviteCodeQuery>,
) -> Result<Json<AssignmentRecord>, AppError> {
    let token_id = parse_token_id(&query.token_id)?.to_string();
    state
        .poker
        .store()
        .lookup(&token_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("invite code assignment"))
}

/// POST /api/poker/invite-code: same contract, served from the file pool
pub async fn assign_poker_file_code(
    State(state): State<AppState>,
    Json(req): Json<InviteCodeRequest>,
) -> Result<Json<Assignment>, AppError> {
    let (token_id, wallet) = gate_poker_request(&state, &req).await?;
    let assignment = state
        .poker_file
        .assign(&token_id, Some(&wallet))
        .await?
        .ok_or(AppError::NoCodesAvailable)?;
    Ok(Json(assignment))
}

/// POST /api/superpoker/invite-code: called by the Discord bot
pub async fn assign_superpoker_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SuperpokerInviteRequest>,
) -> Result<Json<Assignment>, AppError> {
    require_bot_key(&state, &headers)?;
    let discord_id = req.discord_id.trim();
    if discord_id.is_empty() || !discord_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("discord_id must be a Discord snowflake"));
    }
    let username = req
        .discord_username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let assignment = state.superpoker.assign(discord_id, username).await?;
    found(&state, Tenant::Superpoker, assignment)
}

#[cfg(test)]
mod tests {
    use crate::routes::router;
    use crate::test_support::{get_request, json_request, send, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    const WALLET: &str = "0xABCDEF0123456789abcdef0123456789ABCDEF01";

    #[tokio::test]
    async fn poker_assignment_is_idempotent() {
        let (state, _dir) = test_state().await;
        state.poker.store().add_code("AAA").await.unwrap();
        state.poker.store().add_code("BBB").await.unwrap();
        let app = router(state);
        let body = json!({ "token_id": "0042", "wallet_address": WALLET });

        let (status, first) = send(app.clone(), json_request(Method::POST, "/api/invite-code", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["code"], "AAA");
        assert_eq!(first["newlyAssigned"], true);

        let (_, second) = send(app.clone(), json_request(Method::POST, "/api/invite-code", &body)).await;
        assert_eq!(second["code"], "AAA");
        assert_eq!(second["newlyAssigned"], false);

        let (status, record) = send(app, get_request("/api/invite-code?token_id=42")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["code"], "AAA");
        assert_eq!(record["meta"], WALLET.to_lowercase());
    }

    #[tokio::test]
    async fn exhausted_pool_is_404() {
        let (state, _dir) = test_state().await;
        state.poker.store().add_code("AAA").await.unwrap();
        let app = router(state);

        let first = json!({ "token_id": "1", "wallet_address": WALLET });
        let (status, _) = send(app.clone(), json_request(Method::POST, "/api/invite-code", &first)).await;
        assert_eq!(status, StatusCode::OK);

        let second = json!({ "token_id": "2", "wallet_address": WALLET });
        let (status, body) = send(app, json_request(Method::POST, "/api/invite-code", &second)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "NO_CODES_AVAILABLE");
    }

    #[tokio::test]
    async fn malformed_poker_request_is_400() {
        let (state, _dir) = test_state().await;
        let body = json!({ "token_id": "abc", "wallet_address": WALLET });
        let (status, _) = send(router(state), json_request(Method::POST, "/api/invite-code", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn file_pool_serves_its_own_codes() {
        let (state, dir) = test_state().await;
        std::fs::write(dir.path().join("codes.csv"), "code,consumer_player\nFILE1,\n").unwrap();
        state.poker.store().add_code("DB1").await.unwrap();
        let app = router(state);
        let body = json!({ "token_id": "5", "wallet_address": WALLET });

        let (status, got) = send(app.clone(), json_request(Method::POST, "/api/poker/invite-code", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(got["code"], "FILE1");

        let other = json!({ "token_id": "6", "wallet_address": WALLET });
        let (status, _) = send(app, json_request(Method::POST, "/api/poker/invite-code", &other)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn superpoker_requires_bot_key() {
        let (state, _dir) = test_state().await;
        state.superpoker.store().add_code("SP1").await.unwrap();
        let app = router(state);
        let body = json!({ "discord_id": "123456789012345678", "discord_username": "oink" });

        let (status, _) = send(
            app.clone(),
            json_request(Method::POST, "/api/superpoker/invite-code", &body),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut req = json_request(Method::POST, "/api/superpoker/invite-code", &body);
        req.headers_mut().insert("x-api-key", "bot-key".parse().unwrap());
        let (status, got) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(got["code"], "SP1");
    }
}
