use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::RechargeCard;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RedeemCardRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedeemResult {
    pub card_id: Uuid,
    pub amount: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerateCardsRequest {
    pub prefix: String,
    pub count: u32,
    pub amount: i64,
    #[serde(default = "one")]
    pub max_uses: i32,
    #[serde(default = "one")]
    pub max_uses_per_user: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CardList {
    pub items: Vec<RechargeCard>,
}
