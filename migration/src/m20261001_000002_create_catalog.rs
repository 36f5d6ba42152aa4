use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Servers::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Servers::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Servers::Name).string().not_null())
          .col(ColumnDef::new(Servers::Host).string().not_null())
          .col(ColumnDef::new(Servers::Port).integer().not_null())
          .col(ColumnDef::new(Servers::Protocol).string().not_null().default("vless"))
          .col(ColumnDef::new(Servers::PanelUrl).string().not_null())
          .col(ColumnDef::new(Servers::PanelUsername).string().not_null())
          .col(ColumnDef::new(Servers::PanelPassword).string().not_null())
          .col(ColumnDef::new(Servers::InboundId).integer().not_null())
          .col(ColumnDef::new(Servers::PromoInboundId).integer().null())
          .col(ColumnDef::new(Servers::LinkParams).string().null())
          .col(ColumnDef::new(Servers::IsEnabled).boolean().not_null().default(true))
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(Tariffs::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Tariffs::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Tariffs::Name).string().not_null())
          .col(ColumnDef::new(Tariffs::Description).string().not_null().default(""))
          .col(ColumnDef::new(Tariffs::Kind).string().not_null().default("regular"))
          .col(ColumnDef::new(Tariffs::Price).big_integer().not_null())
          .col(ColumnDef::new(Tariffs::Days).integer().not_null())
          .col(ColumnDef::new(Tariffs::ServerId).integer().not_null())
          .col(ColumnDef::new(Tariffs::IsEnabled).boolean().not_null().default(true))
          .foreign_key(
            ForeignKey::create()
              .name("fk_tariffs_server")
              .from(Tariffs::Table, Tariffs::ServerId)
              .to(Servers::Table, Servers::Id),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Tariffs::Table).to_owned()).await?;
    manager.drop_table(Table::drop().table(Servers::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Servers {
  Table,
  Id,
  Name,
  Host,
  Port,
  Protocol,
  PanelUrl,
  PanelUsername,
  PanelPassword,
  InboundId,
  PromoInboundId,
  LinkParams,
  IsEnabled,
}

#[derive(DeriveIden)]
pub enum Tariffs {
  Table,
  Id,
  Name,
  Description,
  Kind,
  Price,
  Days,
  ServerId,
  IsEnabled,
}
