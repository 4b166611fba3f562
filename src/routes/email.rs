use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use serde_json::{json, Value};

use crate::entities::email_verification;
use crate::error::AppError;
use crate::identity::{self, IdentityExtras};
use crate::models::{
    normalize_email, normalize_wallet, now_string, PlatformData, SendVerificationRequest,
    VerifyEmailQuery,
};
use crate::state::AppState;
use crate::token::{generate_verification_token, looks_like_verification_token};

const VERIFICATION_TTL_SECS: i64 = 24 * 60 * 60;

/// POST /api/email/send
pub async fn send_verification(
    State(state): State<AppState>,
    Json(req): Json<SendVerificationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let wallet = normalize_wallet(&req.wallet_address)?;
    let email = normalize_email(&req.email)?;
    identity::ensure_unbound(&state.db, &wallet, &PlatformData::Email { email: email.clone() })
        .await?;

    // Only the newest link for a wallet stays valid
    email_verification::Entity::delete_many()
        .filter(email_verification::Column::WalletAddress.eq(wallet.as_str()))
        .exec(&state.db)
        .await?;

    let token = generate_verification_token();
    email_verification::ActiveModel {
        token: Set(token.clone()),
        wallet_address: Set(wallet.clone()),
        email: Set(email.clone()),
        expires_at: Set(chrono::Utc::now().timestamp() + VERIFICATION_TTL_SECS),
        created_at: Set(now_string()),
    }
    .insert(&state.db)
    .await?;

    let link = format!("{}/api/email/verify?token={token}", state.public_base_url);
    state.mailer.send_verification(&email, &link).await?;
    tracing::info!(wallet = %wallet, "email verification requested");

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "sent" }))))
}

/// Consume `token` and bind its email. `Ok(false)` means there was no
/// live verification for it. The row is deleted in the same transaction as
/// the link, so a token binds at most once.
async fn complete_verification(db: &DatabaseConnection, token: &str) -> Result<bool, AppError> {
    if !looks_like_verification_token(token) {
        return Ok(false);
    }
    let txn = db.begin().await?;
    let pending = email_verification::Entity::find_by_id(token)
        .filter(email_verification::Column::ExpiresAt.gt(chrono::Utc::now().timestamp()))
        .one(&txn)
        .await?;
    let Some(pending) = pending else {
        return Ok(false);
    };

    let consumed = email_verification::Entity::delete_by_id(token)
        .exec(&txn)
        .await?
        .rows_affected;
    if consumed == 0 {
        return Ok(false);
    }

    identity::upsert_identity(
        &txn,
        &pending.wallet_address,
        &PlatformData::Email { email: pending.email.clone() },
        IdentityExtras::default(),
    )
    .await?;
    txn.commit().await?;
    tracing::info!(wallet = %pending.wallet_address, "email verified");
    Ok(true)
}

/// GET /api/email/verify?token=: always answers with a redirect to the app
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Redirect {
    let base = &state.public_base_url;
    let token = query.token.as_deref().map(str::trim).unwrap_or_default();
    match complete_verification(&state.db, token).await {
        Ok(true) => Redirect::to(&format!("{base}/?email_verified=true")),
        Ok(false) => Redirect::to(&format!("{base}/?error=verification_expired")),
        Err(AppError::Conflict(_)) => Redirect::to(&format!("{base}/?error=email_taken")),
        Err(e) => {
            tracing::error!(error = %e, "email verification failed");
            Redirect::to(&format!("{base}/?error=verification_failed"))
        }
    }
}

/// Delete verifications past their expiry. Returns how many were removed.
pub async fn cleanup_expired(db: &DatabaseConnection) -> Result<u64, AppError> {
    let res = email_verification::Entity::delete_many()
        .filter(email_verification::Column::ExpiresAt.lte(chrono::Utc::now().timestamp()))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}
