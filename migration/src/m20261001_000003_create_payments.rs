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
          .table(Payments::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Payments::Reference)
              .string()
              .not_null()
              .primary_key(),
          )
          .col(ColumnDef::new(Payments::Gateway).string().not_null())
          .col(ColumnDef::new(Payments::UserId).big_integer().not_null())
          .col(ColumnDef::new(Payments::TariffId).integer().null())
          .col(ColumnDef::new(Payments::Amount).big_integer().not_null())
          .col(ColumnDef::new(Payments::Topup).boolean().not_null().default(false))
          .col(ColumnDef::new(Payments::PromoCode).string().null())
          .col(ColumnDef::new(Payments::PaymentCode).string().null())
          .col(ColumnDef::new(Payments::Status).string().not_null().default("pending"))
          .col(ColumnDef::new(Payments::RedirectUrl).string().null())
          .col(ColumnDef::new(Payments::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Payments::UpdatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_payments_user")
              .from(Payments::Table, Payments::UserId)
              .to(Users::Table, Users::TgUserId),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_payments_status")
          .table(Payments::Table)
          .col(Payments::Status)
          .col(Payments::CreatedAt)
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(GatewayConfigs::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(GatewayConfigs::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(GatewayConfigs::Gateway).string().not_null())
          .col(ColumnDef::new(GatewayConfigs::Account).string().null())
          .col(ColumnDef::new(GatewayConfigs::Secret).string().not_null())
          .col(ColumnDef::new(GatewayConfigs::ApiUrl).string().null())
          .col(
            ColumnDef::new(GatewayConfigs::IsActive)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(ColumnDef::new(GatewayConfigs::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(GatewayConfigs::Table).to_owned())
      .await?;
    manager.drop_table(Table::drop().table(Payments::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Payments {
  Table,
  Reference,
  Gateway,
  UserId,
  TariffId,
  Amount,
  Topup,
  PromoCode,
  PaymentCode,
  Status,
  RedirectUrl,
  CreatedAt,
  UpdatedAt,
}

#[derive(DeriveIden)]
pub enum GatewayConfigs {
  Table,
  Id,
  Gateway,
  Account,
  Secret,
  ApiUrl,
  IsActive,
  CreatedAt,
}
