use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Order;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub product_id: Uuid,
    #[serde(default)]
    pub use_balance: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TopUpRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderCreated {
    pub order: Order,
    /// Gateway checkout link; absent when the balance covered the whole price.
    pub payment_url: Option<String>,
    /// Delivered code payload for orders settled immediately from balance.
    pub code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
