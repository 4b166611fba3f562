use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_identities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub wallet_address: String,
    pub token_id: Option<String>,
    #[sea_orm(unique)]
    pub discord_id: Option<String>,
    pub discord_username: Option<String>,
    #[sea_orm(unique)]
    pub twitter_id: Option<String>,
    pub twitter_username: Option<String>,
    #[sea_orm(unique)]
    pub email: Option<String>,
    #[sea_orm(unique)]
    pub farcaster_fid: Option<i64>,
    pub farcaster_username: Option<String>,
    #[sea_orm(unique)]
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
