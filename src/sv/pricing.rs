use sea_orm::sea_query::Expr;

use crate::{
  entity::{promo_code, tariff},
  prelude::*,
};

pub struct Pricing<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Pricing<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  /// A code that can still be applied. Nothing is consumed here.
  pub async fn promo(&self, code: &str) -> Result<promo_code::Model> {
    let promo = promo_code::Entity::find_by_id(code)
      .one(self.db)
      .await?
      .ok_or(Promo::NotFound)?;

    if !promo.is_enabled {
      return Err(Promo::Disabled.into());
    }
    if promo.is_exhausted() {
      return Err(Promo::Exhausted.into());
    }
    Ok(promo)
  }

  pub async fn apply(&self, amount: i64, code: Option<&str>) -> Result<i64> {
    match code {
      Some(code) => {
        let promo = self.promo(code).await?;
        Ok(discounted(amount, promo.percentage))
      }
      None => Ok(amount),
    }
  }

  pub async fn price(
    &self,
    tariff: &tariff::Model,
    code: Option<&str>,
  ) -> Result<i64> {
    self.apply(tariff.price, code).await
  }

  pub async fn ensure_sufficient(
    &self,
    tg_user_id: i64,
    required: i64,
  ) -> Result<i64> {
    let available = super::Ledger::new(self.db).sum(tg_user_id).await?;
    if available < required {
      return Err(Error::InsufficientFunds { required, available });
    }
    Ok(available)
  }

  /// Counts one activation. The conditional update keeps the counter at or
  /// below the limit even when two confirmations race for the last use.
  pub async fn redeem_promo(&self, code: &str) -> Result<bool> {
    let res = promo_code::Entity::update_many()
      .col_expr(
        promo_code::Column::ActivationTotal,
        Expr::col(promo_code::Column::ActivationTotal).add(1),
      )
      .filter(promo_code::Column::Code.eq(code))
      .filter(promo_code::Column::IsEnabled.eq(true))
      .filter(
        Expr::col(promo_code::Column::ActivationTotal)
          .lt(Expr::col(promo_code::Column::ActivationLimit)),
      )
      .exec(self.db)
      .await?;

    if res.rows_affected == 0 {
      warn!(code, "Promo code was used up before confirmation");
    }
    Ok(res.rows_affected == 1)
  }

  pub async fn create_promo(
    &self,
    code: &str,
    percentage: i32,
    activation_limit: i32,
  ) -> Result<promo_code::Model> {
    if !(0..=100).contains(&percentage) {
      return Err(Error::validation("percentage must be within 0..=100"));
    }

    let promo = promo_code::ActiveModel {
      code: Set(code.to_string()),
      activation_limit: Set(activation_limit),
      activation_total: Set(0),
      percentage: Set(percentage),
      is_enabled: Set(true),
      created_at: Set(utils::now()),
    };
    Ok(promo.insert(self.db).await?)
  }
}

/// `price * (100 - pct) / 100` on minor units, rounded half-up.
pub fn discounted(price: i64, percentage: i32) -> i64 {
  let pct = i64::from(percentage.clamp(0, 100));
  (price * (100 - pct) + 50) / 100
}
