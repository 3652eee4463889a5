pub mod audit_logs;
pub mod balance_transactions;
pub mod codes;
pub mod orders;
pub mod products;
pub mod recharge_card_usages;
pub mod recharge_cards;
pub mod sea_orm_active_enums;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use balance_transactions::Entity as BalanceTransactions;
pub use codes::Entity as Codes;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use recharge_card_usages::Entity as RechargeCardUsages;
pub use recharge_cards::Entity as RechargeCards;
pub use users::Entity as Users;
