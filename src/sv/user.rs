use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
  entity::{subscription, user},
  prelude::*,
};

pub struct User<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> User<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn get_or_create(
    &self,
    tg_user_id: i64,
    username: Option<String>,
  ) -> Result<user::Model> {
    if let Some(user) = self.by_id(tg_user_id).await? {
      return Ok(user);
    }

    let user = user::ActiveModel {
      tg_user_id: Set(tg_user_id),
      username: Set(username),
      reg_date: Set(utils::now()),
      is_enabled: Set(true),
      trial_used: Set(false),
      referral_code: Set(referral_code()),
      referred_by: Set(None),
      referral_count: Set(0),
      balance: Set(0),
    };

    Ok(user.insert(self.db).await?)
  }

  /// First contact. A valid `referral_code` ties the new user to its owner;
  /// unknown codes and self-referrals are ignored.
  pub async fn register(
    &self,
    tg_user_id: i64,
    username: Option<String>,
    referral_code: Option<&str>,
  ) -> Result<user::Model> {
    if let Some(user) = self.by_id(tg_user_id).await? {
      return Ok(user);
    }

    let mut user = self.get_or_create(tg_user_id, username).await?;

    let Some(code) = referral_code else { return Ok(user) };
    let Some(referrer) = self.by_referral_code(code).await? else {
      debug!(user = tg_user_id, code, "Unknown referral code");
      return Ok(user);
    };
    if referrer.tg_user_id == tg_user_id {
      return Ok(user);
    }

    user = user::ActiveModel {
      referred_by: Set(Some(referrer.tg_user_id)),
      ..user.into()
    }
    .update(self.db)
    .await?;

    user::Entity::update_many()
      .col_expr(
        user::Column::ReferralCount,
        Expr::col(user::Column::ReferralCount).add(1),
      )
      .filter(user::Column::TgUserId.eq(referrer.tg_user_id))
      .exec(self.db)
      .await?;

    info!(user = tg_user_id, referrer = referrer.tg_user_id, "Referred user");
    Ok(user)
  }

  pub async fn by_id(&self, tg_user_id: i64) -> Result<Option<user::Model>> {
    let user = user::Entity::find_by_id(tg_user_id).one(self.db).await?;
    Ok(user)
  }

  pub async fn by_referral_code(
    &self,
    code: &str,
  ) -> Result<Option<user::Model>> {
    let user = user::Entity::find()
      .filter(user::Column::ReferralCode.eq(code))
      .one(self.db)
      .await?;
    Ok(user)
  }

  /// Existing, not banned.
  pub async fn require_enabled(&self, tg_user_id: i64) -> Result<user::Model> {
    let user = self.by_id(tg_user_id).await?.ok_or(Error::NotFound("user"))?;
    if !user.is_enabled {
      return Err(Error::UserDisabled);
    }
    Ok(user)
  }

  /// Bans deactivate every subscription of the user and return the
  /// subscriptions that were active, so their credentials can be revoked.
  pub async fn set_enabled(
    &self,
    tg_user_id: i64,
    enabled: bool,
  ) -> Result<Vec<subscription::Model>> {
    let user = self.by_id(tg_user_id).await?.ok_or(Error::NotFound("user"))?;

    user::ActiveModel { is_enabled: Set(enabled), ..user.into() }
      .update(self.db)
      .await?;

    if enabled {
      return Ok(Vec::new());
    }
    super::Subscription::new(self.db).deactivate_for_user(tg_user_id).await
  }

  /// Flips `trial_used` if it was unset. `false` means the trial is gone.
  pub async fn mark_trial_used(&self, tg_user_id: i64) -> Result<bool> {
    let res = user::Entity::update_many()
      .col_expr(user::Column::TrialUsed, Expr::value(true))
      .filter(user::Column::TgUserId.eq(tg_user_id))
      .filter(user::Column::TrialUsed.eq(false))
      .exec(self.db)
      .await?;
    Ok(res.rows_affected == 1)
  }

  pub async fn count(&self) -> Result<u64> {
    Ok(user::Entity::find().count(self.db).await?)
  }
}

fn referral_code() -> String {
  Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing;

  #[tokio::test]
  async fn referral_links_users() {
    let db = testing::db().await;
    let sv = User::new(&db);

    let referrer = sv.get_or_create(1, Some("alice".into())).await.unwrap();
    let user =
      sv.register(2, None, Some(&referrer.referral_code)).await.unwrap();

    assert_eq!(user.referred_by, Some(1));
    assert_eq!(sv.by_id(1).await.unwrap().unwrap().referral_count, 1);

    // second registration is a no-op
    sv.register(2, None, Some(&referrer.referral_code)).await.unwrap();
    assert_eq!(sv.by_id(1).await.unwrap().unwrap().referral_count, 1);
  }

  #[tokio::test]
  async fn unknown_referral_code_is_ignored() {
    let db = testing::db().await;
    let sv = User::new(&db);

    let user = sv.register(7, None, Some("NOPE")).await.unwrap();
    assert_eq!(user.referred_by, None);
  }

  #[tokio::test]
  async fn trial_is_taken_once() {
    let db = testing::db().await;
    let sv = User::new(&db);
    sv.get_or_create(3, None).await.unwrap();

    assert!(sv.mark_trial_used(3).await.unwrap());
    assert!(!sv.mark_trial_used(3).await.unwrap());
  }

  #[tokio::test]
  async fn banned_user_is_rejected() {
    let db = testing::db().await;
    let sv = User::new(&db);
    sv.get_or_create(4, None).await.unwrap();

    sv.set_enabled(4, false).await.unwrap();
    assert!(matches!(sv.require_enabled(4).await, Err(Error::UserDisabled)));
    assert!(matches!(sv.require_enabled(5).await, Err(Error::NotFound(_))));
  }
}
