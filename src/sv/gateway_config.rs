use sea_orm::sea_query::Expr;

use crate::{
  entity::{GatewayKind, gateway_config},
  prelude::*,
};

/// Provider credentials, rotated at runtime.
pub struct GatewayConfig<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> GatewayConfig<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn active(
    &self,
    gateway: GatewayKind,
  ) -> Result<Option<gateway_config::Model>> {
    let config = gateway_config::Entity::find()
      .filter(gateway_config::Column::Gateway.eq(gateway))
      .filter(gateway_config::Column::IsActive.eq(true))
      .order_by_desc(gateway_config::Column::Id)
      .one(self.db)
      .await?;
    Ok(config)
  }

  /// Stores a new, inactive configuration.
  pub async fn add(
    &self,
    gateway: GatewayKind,
    account: Option<String>,
    secret: String,
    api_url: Option<String>,
  ) -> Result<gateway_config::Model> {
    if !gateway.is_external() {
      return Err(Error::validation(format!("{gateway} takes no credentials")));
    }

    let config = gateway_config::ActiveModel {
      gateway: Set(gateway),
      account: Set(account),
      secret: Set(secret),
      api_url: Set(api_url),
      is_active: Set(false),
      created_at: Set(utils::now()),
      ..Default::default()
    };
    Ok(config.insert(self.db).await?)
  }

  /// Makes `id` the only active configuration of its provider. Run inside a
  /// transaction so readers never see two active rows.
  pub async fn activate(&self, id: i32) -> Result<gateway_config::Model> {
    let config = gateway_config::Entity::find_by_id(id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("gateway config"))?;

    gateway_config::Entity::update_many()
      .col_expr(gateway_config::Column::IsActive, Expr::value(false))
      .filter(gateway_config::Column::Gateway.eq(config.gateway))
      .filter(gateway_config::Column::Id.ne(id))
      .exec(self.db)
      .await?;

    let config = gateway_config::ActiveModel {
      is_active: Set(true),
      ..config.into()
    }
    .update(self.db)
    .await?;

    info!(gateway = %config.gateway, id, "Gateway configuration activated");
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing;

  #[tokio::test]
  async fn activation_rotates_configs() {
    let db = testing::db().await;
    let sv = GatewayConfig::new(&db);

    let first = sv
      .add(GatewayKind::YooKassa, Some("shop".into()), "s1".into(), None)
      .await
      .unwrap();
    let second = sv
      .add(GatewayKind::YooKassa, Some("shop".into()), "s2".into(), None)
      .await
      .unwrap();
    assert!(sv.active(GatewayKind::YooKassa).await.unwrap().is_none());

    sv.activate(first.id).await.unwrap();
    sv.activate(second.id).await.unwrap();

    let active = sv.active(GatewayKind::YooKassa).await.unwrap().unwrap();
    assert_eq!(active.id, second.id);

    let count = gateway_config::Entity::find()
      .filter(gateway_config::Column::IsActive.eq(true))
      .count(&db)
      .await
      .unwrap();
    assert_eq!(count, 1);
  }

  #[tokio::test]
  async fn balance_takes_no_credentials() {
    let db = testing::db().await;
    let err = GatewayConfig::new(&db)
      .add(GatewayKind::Balance, None, "x".into(), None)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }
}
