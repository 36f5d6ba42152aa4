use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Users::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Users::TgUserId)
              .big_integer()
              .not_null()
              .primary_key(),
          )
          .col(ColumnDef::new(Users::Username).string().null())
          .col(ColumnDef::new(Users::RegDate).date_time().not_null())
          .col(ColumnDef::new(Users::IsEnabled).boolean().not_null().default(true))
          .col(ColumnDef::new(Users::TrialUsed).boolean().not_null().default(false))
          .col(
            ColumnDef::new(Users::ReferralCode)
              .string()
              .not_null()
              .unique_key(),
          )
          .col(ColumnDef::new(Users::ReferredBy).big_integer().null())
          .col(ColumnDef::new(Users::ReferralCount).integer().not_null().default(0))
          .col(ColumnDef::new(Users::Balance).big_integer().not_null().default(0))
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Users::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Users {
  Table,
  TgUserId,
  Username,
  RegDate,
  IsEnabled,
  TrialUsed,
  ReferralCode,
  ReferredBy,
  ReferralCount,
  Balance,
}
