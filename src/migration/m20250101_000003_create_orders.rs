use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_catalog::{Products, Users};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                    .col(ColumnDef::new(Orders::ProductId).uuid().null())
                    .col(ColumnDef::new(Orders::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Orders::BalanceUsed).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Orders::Payable).big_integer().not_null())
                    .col(
                        ColumnDef::new(Orders::CorrelationId)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Orders::TradeRef).string_len(128).null())
                    .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                    .col(ColumnDef::new(Orders::RetryCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Orders::LastRetryAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Orders::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Orders::PaidAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Orders::DeliveredAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Orders::Table, Orders::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Orders::Table, Orders::ProductId)
                            .to(Products::Table, Products::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_status_created")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .col(Orders::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Codes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Codes::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Codes::ProductId).uuid().not_null())
                    .col(ColumnDef::new(Codes::Payload).text().not_null())
                    .col(ColumnDef::new(Codes::Sold).boolean().not_null().default(false))
                    .col(ColumnDef::new(Codes::SoldAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Codes::OrderId).uuid().null().unique_key())
                    .col(ColumnDef::new(Codes::CreatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Codes::Table, Codes::ProductId)
                            .to(Products::Table, Products::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Codes::Table, Codes::OrderId)
                            .to(Orders::Table, Orders::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_codes_product_sold")
                    .table(Codes::Table)
                    .col(Codes::ProductId)
                    .col(Codes::Sold)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Codes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    UserId,
    ProductId,
    Amount,
    BalanceUsed,
    Payable,
    CorrelationId,
    TradeRef,
    Status,
    RetryCount,
    LastRetryAt,
    CreatedAt,
    PaidAt,
    DeliveredAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Codes {
    Table,
    Id,
    ProductId,
    Payload,
    Sold,
    SoldAt,
    OrderId,
    CreatedAt,
}
