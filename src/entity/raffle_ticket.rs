use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{raffle, user};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "raffle_tickets")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub raffle_id: i32,
  pub user_id: i64,
  /// Sequential within a raffle, starting at 1
  pub number: i32,
  pub payment_reference: Option<String>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "raffle::Entity",
    from = "Column::RaffleId",
    to = "raffle::Column::Id"
  )]
  Raffle,
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::UserId",
    to = "user::Column::TgUserId"
  )]
  User,
}

impl Related<raffle::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Raffle.def()
  }
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
