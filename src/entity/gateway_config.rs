use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::GatewayKind;

/// Provider credentials; at most one active row per gateway.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gateway_configs")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub gateway: GatewayKind,
  /// Shop id / login, where the provider needs one
  pub account: Option<String>,
  #[serde(skip_serializing)]
  pub secret: String,
  /// Overrides the provider's default endpoint (sandbox, self-hosted)
  pub api_url: Option<String>,
  pub is_active: bool,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
