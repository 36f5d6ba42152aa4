use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{server, tariff, user};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: i64,
  pub tariff_id: i32,
  pub server_id: i32,
  pub started_at: DateTime,
  pub expires_at: DateTime,
  /// Connection link handed to the user
  pub credential: String,
  /// Panel-side client id, needed to revoke the credential
  pub client_id: String,
  pub is_active: bool,
  #[sea_orm(unique)]
  pub payment_reference: Option<String>,
  pub warned_at: Option<DateTime>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::UserId",
    to = "user::Column::TgUserId"
  )]
  User,
  #[sea_orm(
    belongs_to = "tariff::Entity",
    from = "Column::TariffId",
    to = "tariff::Column::Id"
  )]
  Tariff,
  #[sea_orm(
    belongs_to = "server::Entity",
    from = "Column::ServerId",
    to = "server::Column::Id"
  )]
  Server,
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl Related<tariff::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Tariff.def()
  }
}

impl Related<server::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Server.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
