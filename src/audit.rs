use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde_json::Value;
use uuid::Uuid;

use crate::{db::now, entity::audit_logs::ActiveModel as AuditActive, error::AppResult};

pub const ORDER_PAID: &str = "order_paid";
pub const CARD_REDEEMED: &str = "card_redeemed";
pub const AMOUNT_MISMATCH: &str = "amount_mismatch";
pub const DELIVERY_FAILED_PERMANENT: &str = "delivery_failed_permanent";
pub const CODES_IMPORTED: &str = "codes_imported";
pub const CARDS_GENERATED: &str = "cards_generated";

pub async fn log_audit<C: ConnectionTrait>(
    conn: &C,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    AuditActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        action: Set(action.to_string()),
        resource: Set(resource.map(str::to_string)),
        metadata: Set(metadata),
        created_at: Set(now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Best-effort variant for post-commit trails: a failure is logged, never returned.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Value,
) {
    if let Err(err) = log_audit(conn, user_id, action, resource, Some(metadata)).await {
        tracing::warn!(action, error = %err, "audit log failed");
    }
}
