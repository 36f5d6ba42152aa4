use sea_orm::sea_query::Expr;

use crate::{entity::subscription, prelude::*};

pub struct Subscription<'a, C> {
  db: &'a C,
}

pub struct NewSubscription {
  pub user_id: i64,
  pub tariff_id: i32,
  pub server_id: i32,
  pub days: i32,
  pub credential: String,
  pub client_id: String,
  pub payment_reference: Option<String>,
}

impl<'a, C: ConnectionTrait> Subscription<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  /// The only way a subscription row comes into existence. A second insert
  /// for the same payment reference fails on the unique index.
  pub async fn create(
    &self,
    new: NewSubscription,
  ) -> Result<subscription::Model> {
    let now = utils::now();
    let subscription = subscription::ActiveModel {
      user_id: Set(new.user_id),
      tariff_id: Set(new.tariff_id),
      server_id: Set(new.server_id),
      started_at: Set(now),
      expires_at: Set(now + TimeDelta::days(i64::from(new.days))),
      credential: Set(new.credential),
      client_id: Set(new.client_id),
      is_active: Set(true),
      payment_reference: Set(new.payment_reference),
      warned_at: Set(None),
      created_at: Set(now),
      ..Default::default()
    };
    Ok(subscription.insert(self.db).await?)
  }

  pub async fn by_reference(
    &self,
    reference: &str,
  ) -> Result<Option<subscription::Model>> {
    let subscription = subscription::Entity::find()
      .filter(subscription::Column::PaymentReference.eq(reference))
      .one(self.db)
      .await?;
    Ok(subscription)
  }

  pub async fn by_user(
    &self,
    user_id: i64,
    inactive: bool,
  ) -> Result<Vec<subscription::Model>> {
    let mut query = subscription::Entity::find()
      .filter(subscription::Column::UserId.eq(user_id));

    if !inactive {
      query = query.filter(subscription::Column::IsActive.eq(true));
    }

    Ok(query.order_by_desc(subscription::Column::ExpiresAt).all(self.db).await?)
  }

  /// Any subscription of the user for this tariff, active or not.
  pub async fn has_for_tariff(
    &self,
    user_id: i64,
    tariff_id: i32,
  ) -> Result<bool> {
    let count = subscription::Entity::find()
      .filter(subscription::Column::UserId.eq(user_id))
      .filter(subscription::Column::TariffId.eq(tariff_id))
      .count(self.db)
      .await?;
    Ok(count > 0)
  }

  /// Active subscriptions that end within `window` from `now`.
  pub async fn expiring_within(
    &self,
    now: DateTime,
    window: TimeDelta,
    skip_warned: bool,
  ) -> Result<Vec<subscription::Model>> {
    let mut query = subscription::Entity::find()
      .filter(subscription::Column::IsActive.eq(true))
      .filter(subscription::Column::ExpiresAt.gt(now))
      .filter(subscription::Column::ExpiresAt.lte(now + window));

    if skip_warned {
      query = query.filter(subscription::Column::WarnedAt.is_null());
    }

    Ok(query.order_by_asc(subscription::Column::ExpiresAt).all(self.db).await?)
  }

  pub async fn mark_warned(&self, id: i32, at: DateTime) -> Result<()> {
    subscription::Entity::update_many()
      .col_expr(subscription::Column::WarnedAt, Expr::value(Some(at)))
      .filter(subscription::Column::Id.eq(id))
      .exec(self.db)
      .await?;
    Ok(())
  }

  pub async fn deactivate_expired(&self, now: DateTime) -> Result<u64> {
    let res = subscription::Entity::update_many()
      .col_expr(subscription::Column::IsActive, Expr::value(false))
      .filter(subscription::Column::IsActive.eq(true))
      .filter(subscription::Column::ExpiresAt.lt(now))
      .exec(self.db)
      .await?;
    Ok(res.rows_affected)
  }

  pub async fn deactivate_for_user(
    &self,
    user_id: i64,
  ) -> Result<Vec<subscription::Model>> {
    let active = self.by_user(user_id, false).await?;

    subscription::Entity::update_many()
      .col_expr(subscription::Column::IsActive, Expr::value(false))
      .filter(subscription::Column::UserId.eq(user_id))
      .filter(subscription::Column::IsActive.eq(true))
      .exec(self.db)
      .await?;

    Ok(active)
  }

  pub async fn count_active(&self, now: DateTime) -> Result<u64> {
    let count = subscription::Entity::find()
      .filter(subscription::Column::IsActive.eq(true))
      .filter(subscription::Column::ExpiresAt.gt(now))
      .count(self.db)
      .await?;
    Ok(count)
  }
}
