use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(PromoCodes::Table)
          .if_not_exists()
          .col(ColumnDef::new(PromoCodes::Code).string().not_null().primary_key())
          .col(ColumnDef::new(PromoCodes::ActivationLimit).integer().not_null())
          .col(
            ColumnDef::new(PromoCodes::ActivationTotal)
              .integer()
              .not_null()
              .default(0),
          )
          .col(ColumnDef::new(PromoCodes::Percentage).integer().not_null())
          .col(ColumnDef::new(PromoCodes::IsEnabled).boolean().not_null().default(true))
          .col(ColumnDef::new(PromoCodes::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(PaymentCodes::Table)
          .if_not_exists()
          .col(ColumnDef::new(PaymentCodes::Code).string().not_null().primary_key())
          .col(ColumnDef::new(PaymentCodes::Amount).big_integer().not_null())
          .col(
            ColumnDef::new(PaymentCodes::IsEnabled)
              .boolean()
              .not_null()
              .default(true),
          )
          .col(ColumnDef::new(PaymentCodes::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(PaymentCodes::Table).to_owned())
      .await?;
    manager.drop_table(Table::drop().table(PromoCodes::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum PromoCodes {
  Table,
  Code,
  ActivationLimit,
  ActivationTotal,
  Percentage,
  IsEnabled,
  CreatedAt,
}

#[derive(DeriveIden)]
pub enum PaymentCodes {
  Table,
  Code,
  Amount,
  IsEnabled,
  CreatedAt,
}
