use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionTrait};

use crate::{
    audit,
    db::{lock_for_update, with_retry},
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        sea_orm_active_enums::OrderStatus,
    },
    error::{AppError, AppResult},
    events::CommerceEvent,
    gateway::{self, Notification, Params},
    services::{
        inventory_service::ClaimEngine,
        order_service::{deliver, load_order, mark_paid},
    },
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// First confirmation for this order; carries the resulting status.
    Processed(OrderStatus),
    /// The order already left `pending`; acknowledged without side effects.
    Duplicate,
    /// Non-success trade status.
    Ignored,
}

#[derive(Debug)]
pub struct Confirmation {
    pub outcome: CallbackOutcome,
    pub order_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub events: Vec<CommerceEvent>,
}

/// Settle a verified notification against its order in one transaction.
///
/// The order row is locked and `pending -> paid` is a compare-and-set, so at
/// most one concurrent callback claims stock or credits balance.
pub async fn confirm_payment<C>(
    conn: &C,
    claims: &ClaimEngine,
    notification: &Notification,
) -> AppResult<Confirmation>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = conn.begin().await?;
    let backend = txn.get_database_backend();

    let order = lock_for_update(
        Orders::find().filter(OrderCol::CorrelationId.eq(notification.correlation_id.as_str())),
        backend,
    )
    .one(&txn)
    .await?
    .ok_or(AppError::OrderNotFound)?;

    let duplicate = Confirmation {
        outcome: CallbackOutcome::Duplicate,
        order_id: order.id,
        user_id: order.user_id,
        events: Vec::new(),
    };

    if order.status != OrderStatus::Pending {
        return Ok(duplicate);
    }
    if notification.amount != order.payable {
        return Err(AppError::AmountMismatch {
            expected: order.payable,
            received: notification.amount,
        });
    }
    if !mark_paid(&txn, order.id, Some(&notification.trade_ref)).await? {
        return Ok(duplicate);
    }

    let paid = load_order(&txn, order.id).await?;
    let mut events = Vec::new();
    let delivery = deliver(&txn, claims, &paid, OrderStatus::Paid, &mut events).await?;

    txn.commit().await?;

    Ok(Confirmation {
        outcome: CallbackOutcome::Processed(delivery.status),
        order_id: order.id,
        user_id: order.user_id,
        events,
    })
}

/// Entry point for the gateway webhook. The signature is checked first.
pub async fn handle_callback(state: &AppState, params: &Params) -> AppResult<CallbackOutcome> {
    if !gateway::verify_signature(params, &state.gateway.secret_key) {
        tracing::error!(params = ?params, "payment callback rejected: invalid signature");
        return Err(AppError::InvalidSignature);
    }

    let notification = gateway::parse_notification(params).inspect_err(|err| {
        tracing::warn!(params = ?params, error = %err, "malformed payment callback");
    })?;

    if !notification.is_success() {
        tracing::info!(
            correlation_id = %notification.correlation_id,
            status = %notification.status,
            "ignoring non-success trade status"
        );
        return Ok(CallbackOutcome::Ignored);
    }

    let result = with_retry(&state.tx, "confirm_payment", || {
        confirm_payment(&state.orm, &state.claims, &notification)
    })
    .await;

    let confirmation = match result {
        Ok(confirmation) => confirmation,
        Err(err @ AppError::AmountMismatch { expected, received }) => {
            tracing::error!(
                correlation_id = %notification.correlation_id,
                trade_ref = %notification.trade_ref,
                expected,
                received,
                "payment amount mismatch, order left pending"
            );
            audit::record(
                &state.orm,
                None,
                audit::AMOUNT_MISMATCH,
                Some("orders"),
                serde_json::json!({
                    "correlation_id": notification.correlation_id,
                    "trade_ref": notification.trade_ref,
                    "expected": expected,
                    "received": received,
                }),
            )
            .await;
            return Err(err);
        }
        Err(err) => {
            tracing::warn!(
                correlation_id = %notification.correlation_id,
                error = %err,
                "payment callback failed"
            );
            return Err(err);
        }
    };

    let Confirmation {
        outcome,
        order_id,
        user_id,
        events,
    } = confirmation;

    match outcome {
        CallbackOutcome::Processed(status) => {
            state.events.publish_all(events);
            tracing::info!(%order_id, status = ?status, trade_ref = %notification.trade_ref, "payment confirmed");
            audit::record(
                &state.orm,
                Some(user_id),
                audit::ORDER_PAID,
                Some("orders"),
                serde_json::json!({
                    "order_id": order_id,
                    "trade_ref": notification.trade_ref,
                    "amount": notification.amount,
                    "status": status,
                }),
            )
            .await;
        }
        CallbackOutcome::Duplicate => {
            tracing::info!(%order_id, "duplicate payment callback acknowledged");
        }
        CallbackOutcome::Ignored => {}
    }
    Ok(outcome)
}
