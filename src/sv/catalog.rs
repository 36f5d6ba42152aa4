use crate::{
  entity::{Protocol, TariffKind, server, tariff},
  prelude::*,
};

/// Tariffs and the servers they are sold on.
pub struct Catalog<'a, C> {
  db: &'a C,
}

pub struct NewServer<'s> {
  pub name: &'s str,
  pub host: &'s str,
  pub port: i32,
  pub protocol: Protocol,
  pub panel_url: &'s str,
  pub panel_username: &'s str,
  pub panel_password: &'s str,
  pub inbound_id: i32,
  pub promo_inbound_id: Option<i32>,
}

impl<'a, C: ConnectionTrait> Catalog<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn tariff(&self, id: i32) -> Result<Option<tariff::Model>> {
    Ok(tariff::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn server(&self, id: i32) -> Result<Option<server::Model>> {
    Ok(server::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn tariffs(&self, kind: TariffKind) -> Result<Vec<tariff::Model>> {
    let tariffs = tariff::Entity::find()
      .filter(tariff::Column::Kind.eq(kind))
      .filter(tariff::Column::IsEnabled.eq(true))
      .order_by_asc(tariff::Column::Days)
      .all(self.db)
      .await?;
    Ok(tariffs)
  }

  /// Tariff and server regardless of their enabled flags. A payment taken
  /// for a tariff disabled afterwards must still be honoured.
  pub async fn resolve(
    &self,
    tariff_id: i32,
  ) -> Result<(tariff::Model, server::Model)> {
    let tariff =
      self.tariff(tariff_id).await?.ok_or(Error::NotFound("tariff"))?;
    let server =
      self.server(tariff.server_id).await?.ok_or(Error::NotFound("server"))?;
    Ok((tariff, server))
  }

  /// Same as [`Self::resolve`] but only for what is currently on sale.
  pub async fn resolve_enabled(
    &self,
    tariff_id: i32,
  ) -> Result<(tariff::Model, server::Model)> {
    let (tariff, server) = self.resolve(tariff_id).await?;
    if !tariff.is_enabled {
      let msg = format!("tariff `{}` is not on sale", tariff.name);
      return Err(Error::validation(msg));
    }
    if !server.is_enabled {
      let msg = format!("server `{}` is disabled", server.name);
      return Err(Error::validation(msg));
    }
    Ok((tariff, server))
  }

  pub async fn add_server(&self, new: NewServer<'_>) -> Result<server::Model> {
    let server = server::ActiveModel {
      name: Set(new.name.to_string()),
      host: Set(new.host.to_string()),
      port: Set(new.port),
      protocol: Set(new.protocol),
      panel_url: Set(new.panel_url.trim_end_matches('/').to_string()),
      panel_username: Set(new.panel_username.to_string()),
      panel_password: Set(new.panel_password.to_string()),
      inbound_id: Set(new.inbound_id),
      promo_inbound_id: Set(new.promo_inbound_id),
      link_params: Set(None),
      is_enabled: Set(true),
      ..Default::default()
    };
    Ok(server.insert(self.db).await?)
  }

  pub async fn add_tariff(
    &self,
    name: &str,
    kind: TariffKind,
    price: i64,
    days: i32,
    server_id: i32,
  ) -> Result<tariff::Model> {
    if days <= 0 {
      return Err(Error::validation("tariff must last at least one day"));
    }
    let price = if kind == TariffKind::Regular { price } else { 0 };
    if price < 0 {
      return Err(Error::validation("price cannot be negative"));
    }

    let tariff = tariff::ActiveModel {
      name: Set(name.to_string()),
      description: Set(String::new()),
      kind: Set(kind),
      price: Set(price),
      days: Set(days),
      server_id: Set(server_id),
      is_enabled: Set(true),
      ..Default::default()
    };
    Ok(tariff.insert(self.db).await?)
  }
}
