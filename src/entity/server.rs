use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Protocol {
  #[sea_orm(string_value = "vless")]
  #[default]
  Vless,
  #[sea_orm(string_value = "shadowsocks")]
  Shadowsocks,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "servers")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub name: String,
  /// Public address handed out in connection links
  pub host: String,
  pub port: i32,
  pub protocol: Protocol,
  pub panel_url: String,
  pub panel_username: String,
  #[serde(skip_serializing)]
  pub panel_password: String,
  pub inbound_id: i32,
  /// Secondary inbound for promo traffic
  pub promo_inbound_id: Option<i32>,
  /// Extra query string appended to vless links (security, sni, pbk...)
  pub link_params: Option<String>,
  pub is_enabled: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "super::tariff::Entity")]
  Tariffs,
}

impl Related<super::tariff::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Tariffs.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
