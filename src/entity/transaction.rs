use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TransactionType {
  #[sea_orm(string_value = "deposit")]
  #[default]
  Deposit,
  #[sea_orm(string_value = "subscription_payment")]
  SubscriptionPayment,
  #[sea_orm(string_value = "refund")]
  Refund,
  #[sea_orm(string_value = "transfer_in")]
  TransferIn,
  #[sea_orm(string_value = "transfer_out")]
  TransferOut,
  #[sea_orm(string_value = "referral_reward")]
  ReferralReward,
  /// Audit marker for an unconfirmed top-up, never part of the balance
  #[sea_orm(string_value = "pending")]
  Pending,
}

impl TransactionType {
  pub fn counts_to_balance(self) -> bool {
    self != Self::Pending
  }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: i64,
  /// Signed, minor currency units
  pub amount: i64,
  pub tx_type: TransactionType,
  pub description: Option<String>,
  pub payment_reference: Option<String>,
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
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
