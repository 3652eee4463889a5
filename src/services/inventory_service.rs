//! Exactly-once allocation of codes from a product's stock pool.
//!
//! Two dialects sit behind [`CodeClaimer`]:
//! * [`SkipLockedClaimer`] selects one unsold row with `FOR UPDATE SKIP LOCKED`
//!   so concurrent buyers never queue on the same code (PostgreSQL).
//! * [`ConditionalUpdateClaimer`] flips `sold` with a guarded `UPDATE` and lets
//!   the affected-row count decide the winner (SQLite and anything else).

use std::{fmt, future::Future, str::FromStr};

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, DbErr, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Set, TransactionTrait,
};
use sea_orm::sea_query::{Expr, LockBehavior, LockType};
use uuid::Uuid;

use crate::{
    db::now,
    entity::{
        codes::{ActiveModel as CodeActive, Column as CodeCol, Entity as Codes, Model as CodeModel},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
};

/// Rounds a conditional claim may lose to a concurrent writer before giving up.
const CONDITIONAL_CLAIM_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimStrategyKind {
    #[default]
    Auto,
    SkipLocked,
    ConditionalUpdate,
}

impl FromStr for ClaimStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "skip_locked" => Ok(Self::SkipLocked),
            "conditional_update" => Ok(Self::ConditionalUpdate),
            other => Err(format!(
                "unknown claim strategy {other:?}, expected auto|skip_locked|conditional_update"
            )),
        }
    }
}

/// Claim one unsold code of `product_id` for `order_id`.
///
/// Runs in its own transaction (a savepoint when `conn` is already one), so a
/// [`AppError::NoStock`] result leaves the caller's earlier writes intact.
pub trait CodeClaimer {
    fn claim_one<C>(
        &self,
        conn: &C,
        product_id: Uuid,
        order_id: Uuid,
    ) -> impl Future<Output = AppResult<CodeModel>> + Send
    where
        C: ConnectionTrait + TransactionTrait;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SkipLockedClaimer;

impl CodeClaimer for SkipLockedClaimer {
    async fn claim_one<C>(&self, conn: &C, product_id: Uuid, order_id: Uuid) -> AppResult<CodeModel>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = conn.begin().await?;

        let candidate = Codes::find()
            .filter(CodeCol::ProductId.eq(product_id))
            .filter(CodeCol::Sold.eq(false))
            .order_by_asc(CodeCol::CreatedAt)
            .limit(1)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&txn)
            .await?
            .ok_or(AppError::NoStock)?;

        let mut active: CodeActive = candidate.into_active_model();
        active.sold = Set(true);
        active.sold_at = Set(Some(now()));
        active.order_id = Set(Some(order_id));
        let code = active.update(&txn).await?;

        txn.commit().await?;
        Ok(code)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalUpdateClaimer;

impl CodeClaimer for ConditionalUpdateClaimer {
    async fn claim_one<C>(&self, conn: &C, product_id: Uuid, order_id: Uuid) -> AppResult<CodeModel>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = conn.begin().await?;

        for attempt in 1..=CONDITIONAL_CLAIM_ATTEMPTS {
            let candidate = Codes::find()
                .select_only()
                .column(CodeCol::Id)
                .filter(CodeCol::ProductId.eq(product_id))
                .filter(CodeCol::Sold.eq(false))
                .order_by_asc(CodeCol::CreatedAt)
                .limit(1)
                .into_query();

            let result = Codes::update_many()
                .col_expr(CodeCol::Sold, Expr::value(true))
                .col_expr(CodeCol::SoldAt, Expr::value(now()))
                .col_expr(CodeCol::OrderId, Expr::value(order_id))
                .filter(CodeCol::Sold.eq(false))
                .filter(CodeCol::Id.in_subquery(candidate))
                .exec(&txn)
                .await?;

            if result.rows_affected == 1 {
                let code = Codes::find()
                    .filter(CodeCol::OrderId.eq(order_id))
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        AppError::OrmError(DbErr::RecordNotFound(format!(
                            "claimed code for order {order_id}"
                        )))
                    })?;
                txn.commit().await?;
                return Ok(code);
            }

            // Zero rows: either the pool is empty or a concurrent claim took our candidate.
            if unsold_count(&txn, product_id).await? == 0 {
                return Err(AppError::NoStock);
            }
            tracing::debug!(%product_id, attempt, "conditional claim lost a race, retrying");
        }

        Err(AppError::TransientStore(DbErr::RecordNotUpdated))
    }
}

/// The claim dialect chosen for the connected store.
#[derive(Debug, Clone, Copy)]
pub enum ClaimEngine {
    SkipLocked(SkipLockedClaimer),
    ConditionalUpdate(ConditionalUpdateClaimer),
}

impl ClaimEngine {
    pub fn select(kind: ClaimStrategyKind, backend: DbBackend) -> Self {
        let engine = match (kind, backend) {
            (ClaimStrategyKind::Auto, DbBackend::Postgres)
            | (ClaimStrategyKind::SkipLocked, DbBackend::Postgres) => {
                ClaimEngine::SkipLocked(SkipLockedClaimer)
            }
            (ClaimStrategyKind::SkipLocked, other) => {
                tracing::warn!(
                    backend = ?other,
                    "skip_locked needs row locks, falling back to conditional_update"
                );
                ClaimEngine::ConditionalUpdate(ConditionalUpdateClaimer)
            }
            _ => ClaimEngine::ConditionalUpdate(ConditionalUpdateClaimer),
        };
        tracing::info!(strategy = %engine, "claim engine selected");
        engine
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClaimEngine::SkipLocked(_) => "skip_locked",
            ClaimEngine::ConditionalUpdate(_) => "conditional_update",
        }
    }
}

impl fmt::Display for ClaimEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl CodeClaimer for ClaimEngine {
    async fn claim_one<C>(&self, conn: &C, product_id: Uuid, order_id: Uuid) -> AppResult<CodeModel>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let result = match self {
            ClaimEngine::SkipLocked(claimer) => claimer.claim_one(conn, product_id, order_id).await,
            ClaimEngine::ConditionalUpdate(claimer) => {
                claimer.claim_one(conn, product_id, order_id).await
            }
        };
        match &result {
            Ok(code) => tracing::debug!(%product_id, %order_id, code_id = %code.id, "code claimed"),
            Err(AppError::NoStock) => tracing::info!(%product_id, %order_id, "no stock"),
            Err(err) => tracing::warn!(%product_id, %order_id, error = %err, "claim failed"),
        }
        result
    }
}

async fn unsold_count<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> Result<u64, DbErr> {
    Codes::find()
        .filter(CodeCol::ProductId.eq(product_id))
        .filter(CodeCol::Sold.eq(false))
        .count(conn)
        .await
}

/// Unsold codes of a product. Advisory only: a claim may still lose the race.
pub async fn available_stock<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> AppResult<u64> {
    Ok(unsold_count(conn, product_id).await?)
}

/// Insert one unsold code per non-blank line; returns how many were stored.
pub async fn import_codes<C>(conn: &C, product_id: Uuid, payloads: &[String]) -> AppResult<u64>
where
    C: ConnectionTrait + TransactionTrait,
{
    Products::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or(AppError::ProductNotFound)?;

    let created_at = now();
    let rows: Vec<CodeActive> = payloads
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|payload| CodeActive {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            payload: Set(payload.to_string()),
            sold: Set(false),
            sold_at: Set(None),
            order_id: Set(None),
            created_at: Set(created_at),
        })
        .collect();

    let inserted = rows.len() as u64;
    if inserted == 0 {
        return Ok(0);
    }

    let txn = conn.begin().await?;
    Codes::insert_many(rows).exec_without_returning(&txn).await?;
    txn.commit().await?;

    tracing::info!(%product_id, inserted, "codes imported");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_parse() {
        assert_eq!("auto".parse(), Ok(ClaimStrategyKind::Auto));
        assert_eq!("SKIP_LOCKED".parse(), Ok(ClaimStrategyKind::SkipLocked));
        assert_eq!(
            " conditional_update ".parse(),
            Ok(ClaimStrategyKind::ConditionalUpdate)
        );
        assert!("optimistic".parse::<ClaimStrategyKind>().is_err());
    }

    #[test]
    fn auto_follows_the_backend() {
        let pg = ClaimEngine::select(ClaimStrategyKind::Auto, DbBackend::Postgres);
        assert_eq!(pg.name(), "skip_locked");
        let lite = ClaimEngine::select(ClaimStrategyKind::Auto, DbBackend::Sqlite);
        assert_eq!(lite.name(), "conditional_update");
    }

    #[test]
    fn skip_locked_is_downgraded_without_row_locks() {
        let engine = ClaimEngine::select(ClaimStrategyKind::SkipLocked, DbBackend::Sqlite);
        assert_eq!(engine.name(), "conditional_update");
        let forced = ClaimEngine::select(ClaimStrategyKind::ConditionalUpdate, DbBackend::Postgres);
        assert_eq!(forced.name(), "conditional_update");
    }
}
