use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub external_id: String,
    /// Cached sum of this user's ledger rows.
    pub balance: i64,
    pub language: String,
    pub role: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::orders::Entity")]
    Orders,
    #[sea_orm(has_many = "super::balance_transactions::Entity")]
    BalanceTransactions,
    #[sea_orm(has_many = "super::recharge_card_usages::Entity")]
    RechargeCardUsages,
    #[sea_orm(has_many = "super::audit_logs::Entity")]
    AuditLogs,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl Related<super::balance_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BalanceTransactions.def()
    }
}

impl Related<super::recharge_card_usages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RechargeCardUsages.def()
    }
}

impl Related<super::audit_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuditLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
