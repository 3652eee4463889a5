use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    balance_transactions::Model as BalanceTransactionModel,
    orders::Model as OrderModel,
    recharge_cards::Model as RechargeCardModel,
    sea_orm_active_enums::{BalanceKind, OrderStatus},
    users::Model as UserModel,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub balance: i64,
    pub language: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub active: bool,
    pub available: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Option<Uuid>,
    pub amount: i64,
    pub balance_used: i64,
    pub payable: i64,
    pub correlation_id: String,
    pub trade_ref: Option<String>,
    pub status: OrderStatus,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub balance_after: i64,
    pub kind: BalanceKind,
    pub card_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RechargeCard {
    pub id: Uuid,
    pub code: String,
    pub amount: i64,
    pub max_uses: i32,
    pub max_uses_per_user: i32,
    pub used_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<UserModel> for User {
    fn from(model: UserModel) -> Self {
        Self {
            id: model.id,
            external_id: model.external_id,
            balance: model.balance,
            language: model.language,
            role: model.role,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<OrderModel> for Order {
    fn from(model: OrderModel) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            product_id: model.product_id,
            amount: model.amount,
            balance_used: model.balance_used,
            payable: model.payable,
            correlation_id: model.correlation_id,
            trade_ref: model.trade_ref,
            status: model.status,
            retry_count: model.retry_count,
            created_at: model.created_at.with_timezone(&Utc),
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl From<BalanceTransactionModel> for BalanceTransaction {
    fn from(model: BalanceTransactionModel) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            amount: model.amount,
            balance_after: model.balance_after,
            kind: model.kind,
            card_id: model.card_id,
            order_id: model.order_id,
            description: model.description,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<RechargeCardModel> for RechargeCard {
    fn from(model: RechargeCardModel) -> Self {
        Self {
            id: model.id,
            code: model.code,
            amount: model.amount,
            max_uses: model.max_uses,
            max_uses_per_user: model.max_uses_per_user,
            used_count: model.used_count,
            expires_at: model.expires_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}
