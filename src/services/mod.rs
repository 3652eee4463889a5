pub mod admin_service;
pub mod inventory_service;
pub mod ledger_service;
pub mod maintenance_service;
pub mod order_service;
pub mod payment_service;
pub mod product_service;
pub mod recharge_service;
pub mod user_service;
