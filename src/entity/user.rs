use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{subscription, transaction};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub tg_user_id: i64,
  pub username: Option<String>,
  pub reg_date: DateTime,
  pub is_enabled: bool,
  /// The free trial can be taken once per user
  pub trial_used: bool,
  #[sea_orm(unique)]
  pub referral_code: String,
  /// User ID of the referrer (another user who referred this user)
  pub referred_by: Option<i64>,
  pub referral_count: i32,
  /// Cached sum of the ledger, kept in step inside the same transaction
  pub balance: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "subscription::Entity")]
  Subscriptions,
  #[sea_orm(has_many = "transaction::Entity")]
  Transactions,
}

impl Related<subscription::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Subscriptions.def()
  }
}

impl Related<transaction::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Transactions.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
