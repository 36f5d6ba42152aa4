use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Transactions::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Transactions::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Transactions::UserId).big_integer().not_null())
          .col(ColumnDef::new(Transactions::Amount).big_integer().not_null())
          .col(ColumnDef::new(Transactions::TxType).string().not_null())
          .col(ColumnDef::new(Transactions::Description).string().null())
          .col(ColumnDef::new(Transactions::PaymentReference).string().null())
          .col(ColumnDef::new(Transactions::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_transactions_user")
              .from(Transactions::Table, Transactions::UserId)
              .to(Users::Table, Users::TgUserId),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_transactions_user")
          .table(Transactions::Table)
          .col(Transactions::UserId)
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_transactions_reference_type")
          .table(Transactions::Table)
          .col(Transactions::PaymentReference)
          .col(Transactions::TxType)
          .unique()
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Transactions::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Transactions {
  Table,
  Id,
  UserId,
  Amount,
  TxType,
  Description,
  PaymentReference,
  CreatedAt,
}
