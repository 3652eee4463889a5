use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::BalanceKind;

/// Append-only: rows are inserted by the ledger and never updated or deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "balance_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub balance_after: i64,
    pub kind: BalanceKind,
    pub card_id: Option<Uuid>,
    /// Soft reference; expired orders may be purged while their ledger rows stay.
    pub order_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(
        belongs_to = "super::recharge_cards::Entity",
        from = "Column::CardId",
        to = "super::recharge_cards::Column::Id"
    )]
    RechargeCards,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::recharge_cards::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RechargeCards.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
