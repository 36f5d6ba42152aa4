use std::fmt;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum GatewayKind {
  #[sea_orm(string_value = "balance")]
  Balance,
  #[sea_orm(string_value = "code")]
  Code,
  #[sea_orm(string_value = "yookassa")]
  YooKassa,
  #[sea_orm(string_value = "cryptopay")]
  CryptoPay,
  #[sea_orm(string_value = "psp")]
  #[serde(rename = "psp")]
  PsPayments,
}

impl GatewayKind {
  pub fn prefix(self) -> &'static str {
    match self {
      Self::Balance => "balance",
      Self::Code => "code",
      Self::YooKassa => "yookassa",
      Self::CryptoPay => "cryptopay",
      Self::PsPayments => "psp",
    }
  }

  pub fn from_prefix(prefix: &str) -> Option<Self> {
    Some(match prefix {
      "balance" => Self::Balance,
      "code" => Self::Code,
      "yookassa" => Self::YooKassa,
      "cryptopay" => Self::CryptoPay,
      "psp" => Self::PsPayments,
      _ => return None,
    })
  }

  /// Money moves to the merchant account, nothing can be returned locally.
  pub fn is_external(self) -> bool {
    matches!(self, Self::YooKassa | Self::CryptoPay | Self::PsPayments)
  }

  pub fn reference(self, opaque: impl fmt::Display) -> String {
    format!("{}:{opaque}", self.prefix())
  }
}

impl fmt::Display for GatewayKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.prefix())
  }
}

/// `pending -> paid -> activated | compensated | support`, or `pending -> failed`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum PaymentStatus {
  #[sea_orm(string_value = "pending")]
  #[default]
  Pending,
  #[sea_orm(string_value = "paid")]
  Paid,
  #[sea_orm(string_value = "failed")]
  Failed,
  #[sea_orm(string_value = "activated")]
  Activated,
  /// Provisioning failed and the money was handed back
  #[sea_orm(string_value = "compensated")]
  Compensated,
  /// Provisioning failed after an external capture, waits for an operator
  #[sea_orm(string_value = "support")]
  Support,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
  /// `provider:opaque-id`
  #[sea_orm(primary_key, auto_increment = false)]
  pub reference: String,
  pub gateway: GatewayKind,
  pub user_id: i64,
  pub tariff_id: Option<i32>,
  pub amount: i64,
  pub topup: bool,
  pub promo_code: Option<String>,
  pub payment_code: Option<String>,
  pub status: PaymentStatus,
  pub redirect_url: Option<String>,
  pub created_at: DateTime,
  pub updated_at: DateTime,
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
