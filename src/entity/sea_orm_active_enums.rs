use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "paid_no_stock")]
    PaidNoStock,
    #[sea_orm(string_value = "failed_delivery")]
    FailedDelivery,
    #[sea_orm(string_value = "delivery_failed_permanent")]
    DeliveryFailedPermanent,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl OrderStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Expired)
                | (Paid, Delivered)
                | (Paid, PaidNoStock)
                | (Paid, FailedDelivery)
                | (FailedDelivery, Delivered)
                | (FailedDelivery, PaidNoStock)
                | (FailedDelivery, DeliveryFailedPermanent)
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    #[sea_orm(string_value = "top_up")]
    TopUp,
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "refund")]
    Refund,
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn only_pending_orders_can_expire() {
        assert!(Pending.can_transition_to(Expired));
        assert!(!Paid.can_transition_to(Expired));
        assert!(!Delivered.can_transition_to(Expired));
    }

    #[test]
    fn delivery_outcomes_require_payment() {
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(PaidNoStock));
        assert!(Paid.can_transition_to(FailedDelivery));
        assert!(FailedDelivery.can_transition_to(DeliveryFailedPermanent));
        assert!(!DeliveryFailedPermanent.can_transition_to(Delivered));
    }
}
