use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    db::{lock_for_update, now},
    dto::balance::{BalanceView, LedgerList, LedgerReport},
    entity::{
        balance_transactions::{
            ActiveModel as LedgerActive, Column as LedgerCol, Entity as BalanceTransactions,
            Model as LedgerModel,
        },
        sea_orm_active_enums::BalanceKind,
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

#[derive(Debug, Clone)]
pub struct BalanceAdjustment {
    pub user_id: Uuid,
    pub delta: i64,
    pub kind: BalanceKind,
    pub description: String,
    pub card_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
}

impl BalanceAdjustment {
    pub fn new(user_id: Uuid, delta: i64, kind: BalanceKind, description: impl Into<String>) -> Self {
        Self {
            user_id,
            delta,
            kind,
            description: description.into(),
            card_id: None,
            order_id: None,
        }
    }

    pub fn for_card(mut self, card_id: Uuid) -> Self {
        self.card_id = Some(card_id);
        self
    }

    pub fn for_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

/// Apply a signed balance change and append its ledger row atomically.
///
/// Opens its own transaction on `conn`; when `conn` is already a transaction
/// this becomes a savepoint, so a failure here never leaves the cached balance
/// and the ledger out of step.
pub async fn adjust_balance<C>(conn: &C, adjustment: BalanceAdjustment) -> AppResult<LedgerModel>
where
    C: ConnectionTrait + TransactionTrait,
{
    if adjustment.delta == 0 {
        return Err(AppError::BadRequest("balance delta must not be 0".into()));
    }

    let txn = conn.begin().await?;
    let backend = txn.get_database_backend();

    let user = lock_for_update(Users::find_by_id(adjustment.user_id), backend)
        .one(&txn)
        .await?
        .ok_or(AppError::UserNotFound)?;

    let new_balance = user
        .balance
        .checked_add(adjustment.delta)
        .ok_or_else(|| AppError::BadRequest("balance overflow".into()))?;
    if new_balance < 0 {
        return Err(AppError::InsufficientBalance {
            balance: user.balance,
            required: -adjustment.delta,
        });
    }

    // Compare-and-set on the value we read keeps this correct on dialects without row locks.
    let updated = Users::update_many()
        .col_expr(UserCol::Balance, Expr::value(new_balance))
        .filter(UserCol::Id.eq(user.id))
        .filter(UserCol::Balance.eq(user.balance))
        .exec(&txn)
        .await?;
    if updated.rows_affected != 1 {
        return Err(AppError::TransientStore(DbErr::RecordNotUpdated));
    }

    let entry = LedgerActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        amount: Set(adjustment.delta),
        balance_after: Set(new_balance),
        kind: Set(adjustment.kind),
        card_id: Set(adjustment.card_id),
        order_id: Set(adjustment.order_id),
        description: Set(adjustment.description),
        created_at: Set(now()),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    tracing::debug!(
        user_id = %entry.user_id,
        delta = entry.amount,
        balance = entry.balance_after,
        kind = ?entry.kind,
        "balance adjusted"
    );
    Ok(entry)
}

/// Replay the ledger and compare it with the cached balance.
pub async fn verify_ledger<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<LedgerReport> {
    let user = Users::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or(AppError::UserNotFound)?;

    let rows: Vec<(i64, i64)> = BalanceTransactions::find()
        .select_only()
        .column(LedgerCol::Amount)
        .column(LedgerCol::BalanceAfter)
        .filter(LedgerCol::UserId.eq(user_id))
        .into_tuple()
        .all(conn)
        .await?;

    // Rows come back unordered, so partial sums may leave the i64 range.
    let sum: i128 = rows.iter().map(|(amount, _)| i128::from(*amount)).sum();
    let ledger_sum = i64::try_from(sum).unwrap_or(if sum > 0 { i64::MAX } else { i64::MIN });
    let snapshots_non_negative = rows.iter().all(|(_, after)| *after >= 0);

    let report = LedgerReport {
        user_id,
        cached_balance: user.balance,
        ledger_sum,
        entries: rows.len() as u64,
        snapshots_non_negative,
        consistent: sum == i128::from(user.balance) && snapshots_non_negative,
    };

    if !report.consistent {
        tracing::error!(
            user_id = %user_id,
            cached = report.cached_balance,
            ledger = report.ledger_sum,
            "ledger does not match cached balance"
        );
    }
    Ok(report)
}

pub async fn get_balance(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<BalanceView>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::UserNotFound)?;

    Ok(ApiResponse::success(
        "OK",
        BalanceView {
            user_id: model.id,
            balance: model.balance,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_transactions(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<LedgerList>> {
    let (page, limit, offset) = pagination.normalize();

    let finder = BalanceTransactions::find()
        .filter(LedgerCol::UserId.eq(user.user_id))
        .order_by_desc(LedgerCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(ApiResponse::success(
        "Ok",
        LedgerList { items },
        Some(Meta::new(page, limit, total)),
    ))
}
