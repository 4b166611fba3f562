use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::AppError;
use crate::identity::{self, IdentityExtras};
use crate::models::{
    normalize_wallet, parse_token_id, DisconnectRequest, IdentityUpsertRequest, UserIdentity,
    WalletQuery,
};
use crate::state::AppState;

/// GET /api/identity?wallet=
pub async fn get_identity(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> Result<Json<UserIdentity>, AppError> {
    let wallet = normalize_wallet(&query.wallet)?;
    Ok(Json(identity::get_identity(&state.db, &wallet).await?))
}

/// POST /api/identity: link one platform account to a wallet
pub async fn save_identity(
    State(state): State<AppState>,
    Json(req): Json<IdentityUpsertRequest>,
) -> Result<Json<UserIdentity>, AppError> {
    let wallet = normalize_wallet(&req.wallet_address)?;
    let data = req.data.normalized()?;
    let token_id = match req.token_id.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(raw) => Some(parse_token_id(raw)?.to_string()),
        None => None,
    };
    let avatar_url = req
        .avatar_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    let saved =
        identity::upsert_identity(&state.db, &wallet, &data, IdentityExtras { token_id, avatar_url })
            .await?;
    Ok(Json(saved))
}

/// POST /api/disconnect
pub async fn disconnect(
    State(state): State<AppState>,
    Json(req): Json<DisconnectRequest>,
) -> Result<Json<UserIdentity>, AppError> {
    let wallet = normalize_wallet(&req.wallet)?;
    Ok(Json(identity::disconnect(&state.db, &wallet, req.platform).await?))
}

#[cfg(test)]
mod tests {
    use crate::routes::router;
    use crate::test_support::{get_request, json_request, send, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    const ALICE: &str = "0x00000000000000000000000000000000000A11CE";
    const BOB: &str = "0x0000000000000000000000000000000000000b0b";

    #[tokio::test]
    async fn link_read_and_disconnect() {
        let (state, _dir) = test_state().await;
        let app = router(state);

        let discord = json!({
            "wallet_address": ALICE,
            "platform": "discord",
            "discord_id": "123",
            "discord_username": "piggy",
            "token_id": "007"
        });
        let (status, saved) =
            send(app.clone(), json_request(Method::POST, "/api/identity", &discord)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["wallet_address"], ALICE.to_lowercase());
        assert_eq!(saved["token_id"], "7");

        let twitter = json!({
            "wallet": ALICE,
            "platform": "twitter",
            "twitter_id": "t-1",
            "twitter_username": "oink"
        });
        send(app.clone(), json_request(Method::POST, "/api/identity", &twitter)).await;

        let disconnect = json!({ "wallet": ALICE, "platform": "discord" });
        let (status, after) =
            send(app.clone(), json_request(Method::POST, "/api/disconnect", &disconnect)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after["discord_id"], serde_json::Value::Null);
        assert_eq!(after["discord_username"], serde_json::Value::Null);
        assert_eq!(after["twitter_id"], "t-1");

        let (status, read) =
            send(app, get_request(&format!("/api/identity?wallet={ALICE}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["twitter_username"], "oink");
        assert_eq!(read["token_id"], "7");
    }

    #[tokio::test]
    async fn account_linked_to_another_wallet_is_409() {
        let (state, _dir) = test_state().await;
        let app = router(state);
        let link = |wallet: &str| {
            json!({ "wallet_address": wallet, "platform": "username", "username": "piggy_1" })
        };

        let (status, _) = send(app.clone(), json_request(Method::POST, "/api/identity", &link(ALICE))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(app.clone(), json_request(Method::POST, "/api/identity", &link(BOB))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "CONFLICT");

        let (status, _) = send(app, get_request(&format!("/api/identity?wallet={BOB}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn usernames_collide_regardless_of_case() {
        let (state, _dir) = test_state().await;
        let app = router(state);
        let link = |wallet: &str, username: &str| {
            json!({ "wallet_address": wallet, "platform": "username", "username": username })
        };

        let (status, saved) =
            send(app.clone(), json_request(Method::POST, "/api/identity", &link(ALICE, "Piggy_1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["username"], "piggy_1");

        let (status, _) =
            send(app, json_request(Method::POST, "/api/identity", &link(BOB, "PIGGY_1"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn bad_input_is_400() {
        let (state, _dir) = test_state().await;
        let app = router(state);

        let bad_wallet = json!({ "wallet_address": "0x12", "platform": "email", "email": "a@b.co" });
        let (status, _) = send(app.clone(), json_request(Method::POST, "/api/identity", &bad_wallet)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let bad_username = json!({ "wallet_address": ALICE, "platform": "username", "username": "no" });
        let (status, body) = send(app, json_request(Method::POST, "/api/identity", &bad_username)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "VALIDATION");
    }
}
