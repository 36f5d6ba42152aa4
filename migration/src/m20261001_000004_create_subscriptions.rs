use sea_orm_migration::prelude::*;

use super::{
  m20261001_000001_create_users::Users,
  m20261001_000002_create_catalog::{Servers, Tariffs},
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Subscriptions::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Subscriptions::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Subscriptions::UserId).big_integer().not_null())
          .col(ColumnDef::new(Subscriptions::TariffId).integer().not_null())
          .col(ColumnDef::new(Subscriptions::ServerId).integer().not_null())
          .col(ColumnDef::new(Subscriptions::StartedAt).date_time().not_null())
          .col(ColumnDef::new(Subscriptions::ExpiresAt).date_time().not_null())
          .col(ColumnDef::new(Subscriptions::Credential).string().not_null())
          .col(ColumnDef::new(Subscriptions::ClientId).string().not_null())
          .col(
            ColumnDef::new(Subscriptions::IsActive)
              .boolean()
              .not_null()
              .default(true),
          )
          .col(ColumnDef::new(Subscriptions::PaymentReference).string().null())
          .col(ColumnDef::new(Subscriptions::WarnedAt).date_time().null())
          .col(ColumnDef::new(Subscriptions::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_subscriptions_user")
              .from(Subscriptions::Table, Subscriptions::UserId)
              .to(Users::Table, Users::TgUserId),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_subscriptions_tariff")
              .from(Subscriptions::Table, Subscriptions::TariffId)
              .to(Tariffs::Table, Tariffs::Id),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_subscriptions_server")
              .from(Subscriptions::Table, Subscriptions::ServerId)
              .to(Servers::Table, Servers::Id),
          )
          .to_owned(),
      )
      .await?;

    // one subscription per payment reference; NULLs stay distinct
    manager
      .create_index(
        Index::create()
          .name("idx_subscriptions_payment_reference")
          .table(Subscriptions::Table)
          .col(Subscriptions::PaymentReference)
          .unique()
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_subscriptions_expiry")
          .table(Subscriptions::Table)
          .col(Subscriptions::IsActive)
          .col(Subscriptions::ExpiresAt)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Subscriptions {
  Table,
  Id,
  UserId,
  TariffId,
  ServerId,
  StartedAt,
  ExpiresAt,
  Credential,
  ClientId,
  IsActive,
  PaymentReference,
  WarnedAt,
  CreatedAt,
}
