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
                    .table(BalanceTransactions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BalanceTransactions::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(BalanceTransactions::UserId).uuid().not_null())
                    .col(ColumnDef::new(BalanceTransactions::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(BalanceTransactions::BalanceAfter)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(BalanceTransactions::BalanceAfter).gte(0)),
                    )
                    .col(ColumnDef::new(BalanceTransactions::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(BalanceTransactions::CardId).uuid().null())
                    .col(ColumnDef::new(BalanceTransactions::OrderId).uuid().null())
                    .col(ColumnDef::new(BalanceTransactions::Description).text().not_null())
                    .col(
                        ColumnDef::new(BalanceTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(BalanceTransactions::Table, BalanceTransactions::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_balance_transactions_user")
                    .table(BalanceTransactions::Table)
                    .col(BalanceTransactions::UserId)
                    .col(BalanceTransactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_balance_transactions_card")
                    .table(BalanceTransactions::Table)
                    .col(BalanceTransactions::CardId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BalanceTransactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BalanceTransactions {
    Table,
    Id,
    UserId,
    Amount,
    BalanceAfter,
    Kind,
    CardId,
    OrderId,
    Description,
    CreatedAt,
}
