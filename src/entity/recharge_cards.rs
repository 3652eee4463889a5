use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "recharge_cards")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub amount: i64,
    pub max_uses: i32,
    pub max_uses_per_user: i32,
    pub used_count: i32,
    pub expires_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::recharge_card_usages::Entity")]
    RechargeCardUsages,
}

impl Related<super::recharge_card_usages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RechargeCardUsages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
