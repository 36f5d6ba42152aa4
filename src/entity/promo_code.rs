use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_codes")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub code: String,
  pub activation_limit: i32,
  pub activation_total: i32,
  /// Discount percentage, 0..=100
  pub percentage: i32,
  pub is_enabled: bool,
  pub created_at: DateTime,
}

impl Model {
  pub fn is_exhausted(&self) -> bool {
    self.activation_total >= self.activation_limit
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
