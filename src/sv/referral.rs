use sea_orm::sea_query::OnConflict;

use crate::{
  config::ReferralThreshold,
  entity::{PaymentStatus, TransactionType, payment, referral_reward, user},
  prelude::*,
};

pub struct Referral<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Referral<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  /// Referred users of `referrer` that completed at least one purchase.
  pub async fn paying_referrals(&self, referrer: i64) -> Result<u64> {
    let referred: Vec<i64> = user::Entity::find()
      .select_only()
      .column(user::Column::TgUserId)
      .filter(user::Column::ReferredBy.eq(referrer))
      .into_tuple()
      .all(self.db)
      .await?;

    if referred.is_empty() {
      return Ok(0);
    }

    let buyers: Vec<i64> = payment::Entity::find()
      .select_only()
      .column(payment::Column::UserId)
      .distinct()
      .filter(payment::Column::UserId.is_in(referred))
      .filter(payment::Column::Status.eq(PaymentStatus::Activated))
      .filter(payment::Column::Topup.eq(false))
      .into_tuple()
      .all(self.db)
      .await?;

    Ok(buyers.len() as u64)
  }

  /// Credits the referrer of `buyer` for every threshold reached and not yet
  /// paid. Each (referrer, threshold) pair pays out at most once.
  pub async fn evaluate(
    &self,
    buyer: i64,
    thresholds: &[ReferralThreshold],
  ) -> Result<Vec<ReferralThreshold>> {
    let Some(referrer) = user::Entity::find_by_id(buyer)
      .one(self.db)
      .await?
      .and_then(|user| user.referred_by)
    else {
      return Ok(Vec::new());
    };

    let reached = self.paying_referrals(referrer).await?;
    let mut paid = Vec::new();

    for threshold in thresholds {
      if reached < threshold.referrals.max(0) as u64 {
        continue;
      }

      let reward = referral_reward::ActiveModel {
        referrer_id: Set(referrer),
        threshold: Set(threshold.referrals),
        amount: Set(threshold.reward),
        referred_id: Set(buyer),
        created_at: Set(utils::now()),
      };
      let inserted = referral_reward::Entity::insert(reward)
        .on_conflict(
          OnConflict::columns([
            referral_reward::Column::ReferrerId,
            referral_reward::Column::Threshold,
          ])
          .do_nothing()
          .to_owned(),
        )
        .exec_without_returning(self.db)
        .await?;

      if inserted == 0 {
        continue;
      }

      super::Ledger::new(self.db)
        .post(
          referrer,
          threshold.reward,
          TransactionType::ReferralReward,
          format!("Reward for {} referrals", threshold.referrals),
          Some(format!("referral:{referrer}:{}", threshold.referrals)),
        )
        .await?;

      info!(referrer, buyer, threshold = threshold.referrals, "Referral reward");
      paid.push(*threshold);
    }

    Ok(paid)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entity::GatewayKind,
    sv::{self, payment::NewPayment},
    testing,
  };

  async fn purchase(db: &DatabaseConnection, user: i64, reference: &str) {
    sv::Payment::new(db)
      .create(NewPayment {
        reference: reference.to_string(),
        gateway: GatewayKind::Balance,
        user_id: user,
        tariff_id: None,
        amount: 100,
        topup: false,
        promo_code: None,
        payment_code: None,
        status: PaymentStatus::Activated,
        redirect_url: None,
      })
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn threshold_pays_once() {
    let db = testing::db().await;
    let users = sv::User::new(&db);
    let referrer = users.get_or_create(1, None).await.unwrap();
    users.register(2, None, Some(&referrer.referral_code)).await.unwrap();
    users.register(3, None, Some(&referrer.referral_code)).await.unwrap();

    let thresholds = [
      ReferralThreshold { referrals: 1, reward: 5_000 },
      ReferralThreshold { referrals: 2, reward: 10_000 },
    ];
    let referral = Referral::new(&db);

    purchase(&db, 2, "balance:a").await;
    let paid = referral.evaluate(2, &thresholds).await.unwrap();
    assert_eq!(paid, vec![thresholds[0]]);

    // a repeat purchase by the same user does not count twice
    purchase(&db, 2, "balance:b").await;
    assert!(referral.evaluate(2, &thresholds).await.unwrap().is_empty());

    purchase(&db, 3, "balance:c").await;
    let paid = referral.evaluate(3, &thresholds).await.unwrap();
    assert_eq!(paid, vec![thresholds[1]]);

    assert_eq!(sv::Ledger::new(&db).sum(1).await.unwrap(), 15_000);
  }

  #[tokio::test]
  async fn unreferred_buyer_pays_nothing() {
    let db = testing::db().await;
    testing::seed_user(&db, 5).await;
    let thresholds = [ReferralThreshold { referrals: 1, reward: 5_000 }];

    let paid = Referral::new(&db).evaluate(5, &thresholds).await.unwrap();
    assert!(paid.is_empty());
  }
}
