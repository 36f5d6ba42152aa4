use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::server;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TariffKind {
  #[sea_orm(string_value = "regular")]
  #[default]
  Regular,
  #[sea_orm(string_value = "trial")]
  Trial,
  #[sea_orm(string_value = "promo")]
  Promo,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tariffs")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub name: String,
  pub description: String,
  pub kind: TariffKind,
  /// Minor currency units, zero for trial and promo tariffs
  pub price: i64,
  pub days: i32,
  pub server_id: i32,
  pub is_enabled: bool,
}

impl Model {
  pub fn is_free(&self) -> bool {
    self.kind != TariffKind::Regular
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "server::Entity",
    from = "Column::ServerId",
    to = "server::Column::Id"
  )]
  Server,
}

impl Related<server::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Server.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
