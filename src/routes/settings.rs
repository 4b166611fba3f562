use axum::{extract::State, http::HeaderMap, Json};
use sea_orm::{sea_query::OnConflict, ActiveValue::Set, EntityTrait};

use crate::entities::setting;
use crate::error::AppError;
use crate::invites::Tenant;
use crate::models::{now_string, TournamentUrl};
use crate::routes::require_admin;
use crate::state::AppState;

const TOURNAMENT_URL_KEY: &str = "tournament_url";

fn validate_url(raw: &str) -> Result<String, AppError> {
    let url = reqwest::Url::parse(raw.trim())
        .map_err(|_| AppError::validation("url is not a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::validation("url must be an http(s) URL"));
    }
    Ok(url.to_string())
}

/// GET /api/settings/tournament-url
pub async fn get_tournament_url(
    State(state): State<AppState>,
) -> Result<Json<TournamentUrl>, AppError> {
    let url = setting::Entity::find_by_id(TOURNAMENT_URL_KEY)
        .one(&state.db)
        .await?
        .map(|s| s.value);
    Ok(Json(TournamentUrl { url }))
}

/// PUT /api/settings/tournament-url: `{url: null}` clears it
pub async fn put_tournament_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TournamentUrl>,
) -> Result<Json<TournamentUrl>, AppError> {
    require_admin(&state, &headers, Tenant::Poker)?;

    let Some(raw) = req.url.filter(|u| !u.trim().is_empty()) else {
        setting::Entity::delete_by_id(TOURNAMENT_URL_KEY)
            .exec(&state.db)
            .await?;
        tracing::info!("tournament url cleared");
        return Ok(Json(TournamentUrl { url: None }));
    };

    let url = validate_url(&raw)?;
    let row = setting::ActiveModel {
        key: Set(TOURNAMENT_URL_KEY.to_string()),
        value: Set(url.clone()),
        updated_at: Set(now_string()),
    };
    setting::Entity::insert(row)
        .on_conflict(
            OnConflict::column(setting::Column::Key)
                .update_columns([setting::Column::Value, setting::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(&state.db)
        .await?;
    tracing::info!(url = %url, "tournament url updated");
    Ok(Json(TournamentUrl { url: Some(url) }))
}
