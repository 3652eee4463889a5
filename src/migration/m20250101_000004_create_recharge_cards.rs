use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_catalog::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RechargeCards::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RechargeCards::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(RechargeCards::Code).string_len(64).not_null().unique_key())
                    .col(
                        ColumnDef::new(RechargeCards::Amount)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(RechargeCards::Amount).gt(0)),
                    )
                    .col(ColumnDef::new(RechargeCards::MaxUses).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(RechargeCards::MaxUsesPerUser)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(RechargeCards::UsedCount).integer().not_null().default(0))
                    .col(ColumnDef::new(RechargeCards::ExpiresAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(RechargeCards::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RechargeCardUsages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RechargeCardUsages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(RechargeCardUsages::CardId).uuid().not_null())
                    .col(ColumnDef::new(RechargeCardUsages::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(RechargeCardUsages::UseCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RechargeCardUsages::LastUsedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(RechargeCardUsages::Table, RechargeCardUsages::CardId)
                            .to(RechargeCards::Table, RechargeCards::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(RechargeCardUsages::Table, RechargeCardUsages::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_recharge_card_usages_card_user")
                    .table(RechargeCardUsages::Table)
                    .col(RechargeCardUsages::CardId)
                    .col(RechargeCardUsages::UserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RechargeCardUsages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RechargeCards::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RechargeCards {
    Table,
    Id,
    Code,
    Amount,
    MaxUses,
    MaxUsesPerUser,
    UsedCount,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RechargeCardUsages {
    Table,
    Id,
    CardId,
    UserId,
    UseCount,
    LastUsedAt,
}
