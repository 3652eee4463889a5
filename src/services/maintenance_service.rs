//! Periodic sweeps over the order table. Each order is handled in its own
//! transaction so one bad row never blocks the rest of a batch.

use chrono::Duration as ChronoDuration;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, prelude::DateTimeWithTimeZone,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    audit,
    config::MaintenanceConfig,
    db::with_retry,
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        sea_orm_active_enums::{BalanceKind, OrderStatus},
    },
    error::{AppError, AppResult},
    events::CommerceEvent,
    services::{
        inventory_service::ClaimEngine,
        ledger_service::{BalanceAdjustment, adjust_balance},
        order_service::{deliver, lock_order, transition},
    },
    state::AppState,
};

fn before(now: DateTimeWithTimeZone, age: std::time::Duration) -> AppResult<DateTimeWithTimeZone> {
    let age = ChronoDuration::from_std(age)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid sweep age: {e}")))?;
    Ok(now - age)
}

async fn ids_where<C: ConnectionTrait>(
    conn: &C,
    condition: Condition,
    order_by: OrderCol,
    limit: u64,
) -> AppResult<Vec<Uuid>> {
    Ok(Orders::find()
        .select_only()
        .column(OrderCol::Id)
        .filter(condition)
        .order_by_asc(order_by)
        .limit(limit)
        .into_tuple()
        .all(conn)
        .await?)
}

/// Expire one order if it is still `pending` and strictly older than `cutoff`,
/// refunding any balance it consumed.
pub async fn expire_order<C>(
    conn: &C,
    order_id: Uuid,
    cutoff: DateTimeWithTimeZone,
) -> AppResult<Option<CommerceEvent>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = conn.begin().await?;
    let Some(order) = lock_order(&txn, order_id).await? else {
        return Ok(None);
    };
    if order.status != OrderStatus::Pending || order.created_at >= cutoff {
        return Ok(None);
    }
    if !transition(&txn, order.id, OrderStatus::Pending, OrderStatus::Expired).await? {
        return Ok(None);
    }

    if order.balance_used > 0 {
        adjust_balance(
            &txn,
            BalanceAdjustment::new(
                order.user_id,
                order.balance_used,
                BalanceKind::Refund,
                format!("refund for expired order {}", order.correlation_id),
            )
            .for_order(order.id),
        )
        .await?;
    }

    txn.commit().await?;
    tracing::info!(order_id = %order.id, refunded = order.balance_used, "order expired");
    Ok(Some(CommerceEvent::OrderExpired {
        order_id: order.id,
        user_id: order.user_id,
        refunded: order.balance_used,
    }))
}

/// Expire `pending` orders created strictly before `now - order_ttl`.
pub async fn expire_pending_orders(state: &AppState, now: DateTimeWithTimeZone) -> AppResult<u64> {
    let cutoff = before(now, state.maintenance.order_ttl)?;
    let ids = ids_where(
        &state.orm,
        Condition::all()
            .add(OrderCol::Status.eq(OrderStatus::Pending))
            .add(OrderCol::CreatedAt.lt(cutoff)),
        OrderCol::CreatedAt,
        state.maintenance.batch_size,
    )
    .await?;

    let mut expired = 0;
    for order_id in ids {
        match with_retry(&state.tx, "expire_order", || expire_order(&state.orm, order_id, cutoff)).await
        {
            Ok(Some(event)) => {
                state.events.publish(event);
                expired += 1;
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(%order_id, error = %err, "failed to expire order"),
        }
    }
    if expired > 0 {
        tracing::info!(expired, "expiration sweep finished");
    }
    Ok(expired)
}

/// Delete `expired` orders older than the retention window. Ledger rows keep
/// their order reference as a plain value.
pub async fn purge_expired_orders(state: &AppState, now: DateTimeWithTimeZone) -> AppResult<u64> {
    let cutoff = before(now, state.maintenance.order_retention)?;
    let ids = ids_where(
        &state.orm,
        Condition::all()
            .add(OrderCol::Status.eq(OrderStatus::Expired))
            .add(OrderCol::CreatedAt.lt(cutoff)),
        OrderCol::CreatedAt,
        state.maintenance.batch_size,
    )
    .await?;

    let mut purged = 0;
    for order_id in ids {
        let result = Orders::delete_many()
            .filter(OrderCol::Id.eq(order_id))
            .filter(OrderCol::Status.eq(OrderStatus::Expired))
            .exec(&state.orm)
            .await;
        match result {
            Ok(res) => purged += res.rows_affected,
            Err(err) => tracing::warn!(%order_id, error = %err, "failed to purge order"),
        }
    }
    if purged > 0 {
        tracing::info!(purged, "cleanup sweep finished");
    }
    Ok(purged)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Delivered,
    NoStock,
    StillFailing,
    GaveUp { retry_count: i32 },
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryReport {
    pub delivered: u64,
    pub no_stock: u64,
    pub still_failing: u64,
    pub gave_up: u64,
}

/// One delivery retry for a `failed_delivery` order.
pub async fn retry_delivery<C>(
    conn: &C,
    claims: &ClaimEngine,
    config: &MaintenanceConfig,
    order_id: Uuid,
    now: DateTimeWithTimeZone,
) -> AppResult<(RetryOutcome, Vec<CommerceEvent>)>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = conn.begin().await?;
    let Some(order) = lock_order(&txn, order_id).await? else {
        return Ok((RetryOutcome::Skipped, Vec::new()));
    };
    if order.status != OrderStatus::FailedDelivery {
        return Ok((RetryOutcome::Skipped, Vec::new()));
    }
    let gap_start = before(now, config.retry_min_gap)?;
    if order.last_retry_at.is_some_and(|at| at > gap_start) {
        return Ok((RetryOutcome::Skipped, Vec::new()));
    }

    if order.retry_count >= config.retry_max_attempts {
        transition(
            &txn,
            order.id,
            OrderStatus::FailedDelivery,
            OrderStatus::DeliveryFailedPermanent,
        )
        .await?;
        txn.commit().await?;
        let event = CommerceEvent::DeliveryFailedPermanent {
            order_id: order.id,
            user_id: order.user_id,
            retry_count: order.retry_count,
        };
        return Ok((
            RetryOutcome::GaveUp {
                retry_count: order.retry_count,
            },
            vec![event],
        ));
    }

    Orders::update_many()
        .col_expr(OrderCol::RetryCount, Expr::col(OrderCol::RetryCount).add(1))
        .col_expr(OrderCol::LastRetryAt, Expr::value(now))
        .col_expr(OrderCol::UpdatedAt, Expr::value(now))
        .filter(OrderCol::Id.eq(order.id))
        .filter(OrderCol::Status.eq(OrderStatus::FailedDelivery))
        .exec(&txn)
        .await?;

    let mut events = Vec::new();
    let delivery = deliver(&txn, claims, &order, OrderStatus::FailedDelivery, &mut events).await?;
    txn.commit().await?;

    let outcome = match delivery.status {
        OrderStatus::Delivered => RetryOutcome::Delivered,
        OrderStatus::PaidNoStock => RetryOutcome::NoStock,
        _ => RetryOutcome::StillFailing,
    };
    tracing::info!(%order_id, attempt = order.retry_count + 1, outcome = ?outcome, "delivery retried");
    Ok((outcome, events))
}

/// Retry `failed_delivery` orders whose last attempt is at least `retry_min_gap` old.
pub async fn retry_failed_deliveries(
    state: &AppState,
    now: DateTimeWithTimeZone,
) -> AppResult<RetryReport> {
    let gap_start = before(now, state.maintenance.retry_min_gap)?;
    let ids = ids_where(
        &state.orm,
        Condition::all()
            .add(OrderCol::Status.eq(OrderStatus::FailedDelivery))
            .add(
                Condition::any()
                    .add(OrderCol::LastRetryAt.is_null())
                    .add(OrderCol::LastRetryAt.lte(gap_start)),
            ),
        OrderCol::UpdatedAt,
        state.maintenance.batch_size,
    )
    .await?;

    let mut report = RetryReport::default();
    for order_id in ids {
        let result = with_retry(&state.tx, "retry_delivery", || {
            retry_delivery(&state.orm, &state.claims, &state.maintenance, order_id, now)
        })
        .await;

        let (outcome, events) = match result {
            Ok(done) => done,
            Err(err) => {
                tracing::warn!(%order_id, error = %err, "delivery retry errored");
                continue;
            }
        };
        state.events.publish_all(events);

        match outcome {
            RetryOutcome::Delivered => report.delivered += 1,
            RetryOutcome::NoStock => report.no_stock += 1,
            RetryOutcome::StillFailing => report.still_failing += 1,
            RetryOutcome::GaveUp { retry_count } => {
                report.gave_up += 1;
                tracing::error!(%order_id, retry_count, "delivery failed permanently");
                audit::record(
                    &state.orm,
                    None,
                    audit::DELIVERY_FAILED_PERMANENT,
                    Some("orders"),
                    serde_json::json!({ "order_id": order_id, "retry_count": retry_count }),
                )
                .await;
            }
            RetryOutcome::Skipped => {}
        }
    }
    Ok(report)
}
