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
          .table(Raffles::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Raffles::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Raffles::Name).string().not_null())
          .col(ColumnDef::new(Raffles::IsActive).boolean().not_null().default(true))
          .col(ColumnDef::new(Raffles::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(RaffleTickets::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(RaffleTickets::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(RaffleTickets::RaffleId).integer().not_null())
          .col(ColumnDef::new(RaffleTickets::UserId).big_integer().not_null())
          .col(ColumnDef::new(RaffleTickets::Number).integer().not_null())
          .col(ColumnDef::new(RaffleTickets::PaymentReference).string().null())
          .col(ColumnDef::new(RaffleTickets::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_raffle_tickets_raffle")
              .from(RaffleTickets::Table, RaffleTickets::RaffleId)
              .to(Raffles::Table, Raffles::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_raffle_tickets_user")
              .from(RaffleTickets::Table, RaffleTickets::UserId)
              .to(Users::Table, Users::TgUserId),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_raffle_tickets_number")
          .table(RaffleTickets::Table)
          .col(RaffleTickets::RaffleId)
          .col(RaffleTickets::Number)
          .unique()
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(RaffleTickets::Table).to_owned())
      .await?;
    manager.drop_table(Table::drop().table(Raffles::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Raffles {
  Table,
  Id,
  Name,
  IsActive,
  CreatedAt,
}

#[derive(DeriveIden)]
pub enum RaffleTickets {
  Table,
  Id,
  RaffleId,
  UserId,
  Number,
  PaymentReference,
  CreatedAt,
}
