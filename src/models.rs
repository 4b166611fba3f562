use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use crate::entities::user_identity::Model as UserIdentity;

/// Timestamp format shared by every table.
pub fn now_string() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `0x` + 40 hex digits, returned lowercased.
pub fn normalize_wallet(raw: &str) -> Result<String, AppError> {
    let wallet = raw.trim();
    let hex = wallet
        .strip_prefix("0x")
        .or_else(|| wallet.strip_prefix("0X"))
        .ok_or_else(|| AppError::validation("wallet address must start with 0x"))?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::validation("wallet address must be 40 hex digits"));
    }
    Ok(format!("0x{}", hex.to_ascii_lowercase()))
}

/// NFT token ids are unsigned decimal integers.
pub fn parse_token_id(raw: &str) -> Result<u128, AppError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("token_id must be a decimal number"));
    }
    raw.parse()
        .map_err(|_| AppError::validation("token_id is out of range"))
}

pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid || email.len() > 254 {
        return Err(AppError::validation("invalid email address"));
    }
    Ok(email)
}

/// Usernames are unique regardless of case, so they are stored lowercased.
pub fn validate_username(raw: &str) -> Result<String, AppError> {
    let username = raw.trim();
    if username.len() < 3 || username.len() > 32 {
        return Err(AppError::validation("Username must be 3-32 characters"));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::validation("Username can only contain letters, numbers and _"));
    }
    Ok(username.to_ascii_lowercase())
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ─── Invites ───

#[derive(Debug, Deserialize)]
pub struct InviteCodeRequest {
    pub token_id: String,
    pub wallet_address: String,
}

#[derive(Debug, Deserialize)]
pub struct InviteCodeQuery {
    pub token_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SuperpokerInviteRequest {
    pub discord_id: String,
    pub discord_username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordUsageRequest {
    pub invite_code: String,
    pub player_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearCodesResponse {
    pub removed: u64,
}

// ─── Identity ───

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Discord,
    Twitter,
    Farcaster,
    Email,
    Username,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Platform::Discord => "discord",
            Platform::Twitter => "twitter",
            Platform::Farcaster => "farcaster",
            Platform::Email => "email",
            Platform::Username => "username",
        }
    }
}

/// Fields a platform link writes onto the identity row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformData {
    Discord {
        discord_id: String,
        discord_username: Option<String>,
    },
    Twitter {
        twitter_id: String,
        twitter_username: Option<String>,
    },
    Farcaster {
        farcaster_fid: i64,
        farcaster_username: Option<String>,
    },
    Email {
        email: String,
    },
    Username {
        username: String,
    },
}

impl PlatformData {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformData::Discord { .. } => Platform::Discord,
            PlatformData::Twitter { .. } => Platform::Twitter,
            PlatformData::Farcaster { .. } => Platform::Farcaster,
            PlatformData::Email { .. } => Platform::Email,
            PlatformData::Username { .. } => Platform::Username,
        }
    }

    /// Trim, lowercase where the platform is case-insensitive, and reject
    /// empty ids.
    pub fn normalized(self) -> Result<Self, AppError> {
        Ok(match self {
            PlatformData::Discord { discord_id, discord_username } => PlatformData::Discord {
                discord_id: required(&discord_id, "discord_id")?,
                discord_username: optional(discord_username),
            },
            PlatformData::Twitter { twitter_id, twitter_username } => PlatformData::Twitter {
                twitter_id: required(&twitter_id, "twitter_id")?,
                twitter_username: optional(twitter_username),
            },
            PlatformData::Farcaster { farcaster_fid, farcaster_username } => {
                if farcaster_fid <= 0 {
                    return Err(AppError::validation("farcaster_fid must be positive"));
                }
                PlatformData::Farcaster {
                    farcaster_fid,
                    farcaster_username: optional(farcaster_username),
                }
            }
            PlatformData::Email { email } => PlatformData::Email {
                email: normalize_email(&email)?,
            },
            PlatformData::Username { username } => PlatformData::Username {
                username: validate_username(&username)?,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct IdentityUpsertRequest {
    #[serde(alias = "wallet")]
    pub wallet_address: String,
    pub token_id: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub data: PlatformData,
}

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    pub wallet: String,
}

#[derive(Debug, Deserialize)]
pub struct DisconnectRequest {
    #[serde(alias = "wallet_address")]
    pub wallet: String,
    pub platform: Platform,
}

// ─── Email verification ───

#[derive(Debug, Deserialize)]
pub struct SendVerificationRequest {
    #[serde(alias = "wallet")]
    pub wallet_address: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}

// ─── Settings ───

#[derive(Debug, Serialize, Deserialize)]
pub struct TournamentUrl {
    pub url: Option<String>,
}
