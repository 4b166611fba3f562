//! Wallet ↔ social account links.
//!
//! Every platform id may be bound to one wallet at most. The pre-check gives
//! a readable conflict; the unique indexes on `user_identities` are the real
//! guard, and a violation raised by the write is reported the same way.

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, SqlErr, TransactionTrait,
};

use crate::entities::user_identity;
use crate::error::AppError;
use crate::models::{now_string, Platform, PlatformData, UserIdentity};

/// Optional fields that ride along with any platform link.
#[derive(Debug, Default, Clone)]
pub struct IdentityExtras {
    pub token_id: Option<String>,
    pub avatar_url: Option<String>,
}

fn conflict_message(platform: Platform) -> String {
    format!("{} account already linked to another wallet", platform.name())
}

fn map_write_err(e: DbErr, platform: Platform) -> AppError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::conflict(conflict_message(platform)),
        _ => e.into(),
    }
}

pub async fn get_identity(db: &DatabaseConnection, wallet: &str) -> Result<UserIdentity, AppError> {
    user_identity::Entity::find_by_id(wallet)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("identity"))
}

/// Fails with Conflict when the platform id in `data` belongs to a wallet
/// other than `wallet`.
pub async fn ensure_unbound<C: ConnectionTrait>(
    conn: &C,
    wallet: &str,
    data: &PlatformData,
) -> Result<(), AppError> {
    use user_identity::Column;

    let owned_by = match data {
        PlatformData::Discord { discord_id, .. } => Column::DiscordId.eq(discord_id.as_str()),
        PlatformData::Twitter { twitter_id, .. } => Column::TwitterId.eq(twitter_id.as_str()),
        PlatformData::Farcaster { farcaster_fid, .. } => Column::FarcasterFid.eq(*farcaster_fid),
        PlatformData::Email { email } => Column::Email.eq(email.as_str()),
        PlatformData::Username { username } => Column::Username.eq(username.as_str()),
    };
    let other = user_identity::Entity::find()
        .filter(owned_by)
        .filter(Column::WalletAddress.ne(wallet))
        .one(conn)
        .await?;
    if let Some(other) = other {
        tracing::warn!(
            wallet,
            other = %other.wallet_address,
            platform = data.platform().name(),
            "platform account already bound"
        );
        return Err(AppError::conflict(conflict_message(data.platform())));
    }
    Ok(())
}

fn apply(am: &mut user_identity::ActiveModel, data: &PlatformData) {
    match data.clone() {
        PlatformData::Discord { discord_id, discord_username } => {
            am.discord_id = Set(Some(discord_id));
            am.discord_username = Set(discord_username);
        }
        PlatformData::Twitter { twitter_id, twitter_username } => {
            am.twitter_id = Set(Some(twitter_id));
            am.twitter_username = Set(twitter_username);
        }
        PlatformData::Farcaster { farcaster_fid, farcaster_username } => {
            am.farcaster_fid = Set(Some(farcaster_fid));
            am.farcaster_username = Set(farcaster_username);
        }
        PlatformData::Email { email } => am.email = Set(Some(email)),
        PlatformData::Username { username } => am.username = Set(Some(username)),
    }
}

/// Link one platform account to `wallet`, creating the identity row on first
/// use. `wallet` and `data` must already be normalized. Called on an open
/// transaction it runs inside a savepoint of that transaction.
pub async fn upsert_identity<C: TransactionTrait>(
    db: &C,
    wallet: &str,
    data: &PlatformData,
    extras: IdentityExtras,
) -> Result<UserIdentity, AppError> {
    let platform = data.platform();
    let now = now_string();
    let txn = db.begin().await?;

    ensure_unbound(&txn, wallet, data).await?;

    let existing = user_identity::Entity::find_by_id(wallet).one(&txn).await?;
    let saved = match existing {
        Some(model) => {
            let mut am: user_identity::ActiveModel = model.into();
            apply(&mut am, data);
            if let Some(token_id) = extras.token_id {
                am.token_id = Set(Some(token_id));
            }
            if let Some(avatar_url) = extras.avatar_url {
                am.avatar_url = Set(Some(avatar_url));
            }
            am.updated_at = Set(now);
            am.update(&txn).await
        }
        None => {
            let mut am = user_identity::ActiveModel {
                wallet_address: Set(wallet.to_string()),
                token_id: Set(extras.token_id),
                avatar_url: Set(extras.avatar_url),
                created_at: Set(now.clone()),
                updated_at: Set(now),
                ..Default::default()
            };
            apply(&mut am, data);
            am.insert(&txn).await
        }
    }
    .map_err(|e| map_write_err(e, platform))?;

    txn.commit().await.map_err(|e| map_write_err(e, platform))?;
    tracing::info!(wallet, platform = platform.name(), "identity linked");
    Ok(saved)
}

/// Null the columns of one platform. Other platforms are left untouched.
pub async fn disconnect(
    db: &DatabaseConnection,
    wallet: &str,
    platform: Platform,
) -> Result<UserIdentity, AppError> {
    let model = get_identity(db, wallet).await?;
    let mut am: user_identity::ActiveModel = model.into();
    match platform {
        Platform::Discord => {
            am.discord_id = Set(None);
            am.discord_username = Set(None);
        }
        Platform::Twitter => {
            am.twitter_id = Set(None);
            am.twitter_username = Set(None);
        }
        Platform::Farcaster => {
            am.farcaster_fid = Set(None);
            am.farcaster_username = Set(None);
        }
        Platform::Email => am.email = Set(None),
        Platform::Username => am.username = Set(None),
    }
    am.updated_at = Set(now_string());
    let saved = am.update(db).await?;
    tracing::info!(wallet, platform = platform.name(), "identity platform disconnected");
    Ok(saved)
}
