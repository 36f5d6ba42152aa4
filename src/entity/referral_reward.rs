use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user;

/// One row per referrer per reached threshold, so a threshold pays out once.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "referral_rewards")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub referrer_id: i64,
  #[sea_orm(primary_key, auto_increment = false)]
  pub threshold: i32,
  pub amount: i64,
  /// The purchase that pushed the referrer over the threshold
  pub referred_id: i64,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::ReferrerId",
    to = "user::Column::TgUserId"
  )]
  Referrer,
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Referrer.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
