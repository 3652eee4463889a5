use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::BalanceTransaction;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceView {
    pub user_id: Uuid,
    pub balance: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LedgerList {
    pub items: Vec<BalanceTransaction>,
}

/// Result of replaying a user's ledger against the cached balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LedgerReport {
    pub user_id: Uuid,
    pub cached_balance: i64,
    pub ledger_sum: i64,
    pub entries: u64,
    pub snapshots_non_negative: bool,
    pub consistent: bool,
}
