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
          .table(ReferralRewards::Table)
          .if_not_exists()
          .col(ColumnDef::new(ReferralRewards::ReferrerId).big_integer().not_null())
          .col(ColumnDef::new(ReferralRewards::Threshold).integer().not_null())
          .col(ColumnDef::new(ReferralRewards::Amount).big_integer().not_null())
          .col(ColumnDef::new(ReferralRewards::ReferredId).big_integer().not_null())
          .col(ColumnDef::new(ReferralRewards::CreatedAt).date_time().not_null())
          .primary_key(
            Index::create()
              .col(ReferralRewards::ReferrerId)
              .col(ReferralRewards::Threshold),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_referral_rewards_referrer")
              .from(ReferralRewards::Table, ReferralRewards::ReferrerId)
              .to(Users::Table, Users::TgUserId),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(ReferralRewards::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum ReferralRewards {
  Table,
  ReferrerId,
  Threshold,
  Amount,
  ReferredId,
  CreatedAt,
}
