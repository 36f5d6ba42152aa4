//! Entry points used by bot handlers, the HTTP API and webhooks. Every
//! operation here is safe to call repeatedly.

mod activator;
mod guard;

pub use activator::{Activator, Confirmation};
pub use guard::{Guard, Lease};

use crate::{
  entity::{GatewayKind, PaymentStatus, subscription, user},
  gateway::{Gateway, Initiated, Invoice, Meta, PromoAdjusted},
  prelude::*,
  provision::{Provisioner, Variant},
  state::AppState,
  sv,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purchase {
  Tariff(i32),
  /// Minor units credited to the balance
  TopUp(i64),
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
  pub user_id: i64,
  pub purchase: Purchase,
  pub gateway: GatewayKind,
  pub promo_code: Option<String>,
  pub payment_code: Option<String>,
}

pub struct Checkout<'a> {
  app: &'a AppState,
}

impl<'a> Checkout<'a> {
  pub fn new(app: &'a AppState) -> Self {
    Self { app }
  }

  pub async fn register(
    &self,
    tg_user_id: i64,
    username: Option<String>,
    referral_code: Option<String>,
  ) -> Result<user::Model> {
    self
      .app
      .store
      .run(|txn| {
        let (username, code) = (username.clone(), referral_code.clone());
        Box::pin(async move {
          sv::User::new(txn)
            .register(tg_user_id, username, code.as_deref())
            .await
        })
      })
      .await
  }

  pub async fn initiate_payment(
    &self,
    request: PaymentRequest,
  ) -> Result<Initiated> {
    let PaymentRequest { user_id, purchase, gateway, promo_code, payment_code } =
      request;

    let (amount, description, tariff_id) = self
      .app
      .store
      .read(move |db| {
        Box::pin(async move {
          sv::User::new(db).require_enabled(user_id).await?;
          match purchase {
            Purchase::Tariff(id) => {
              let (tariff, _) =
                sv::Catalog::new(db).resolve_enabled(id).await?;
              if tariff.is_free() {
                return Err(Error::validation("this tariff is free"));
              }
              Ok((tariff.price, tariff.name, Some(tariff.id)))
            }
            Purchase::TopUp(amount) => {
              Ok((amount, "Balance top-up".to_string(), None))
            }
          }
        })
      })
      .await?;

    let topup = matches!(purchase, Purchase::TopUp(_));
    if topup && (amount <= 0 || !gateway.is_external()) {
      return Err(Error::validation("top-ups go through a payment provider"));
    }

    let base = self.app.gateways.get(gateway)?;
    let channel: Arc<dyn Gateway> = match promo_code.clone() {
      Some(code) => {
        Arc::new(PromoAdjusted::new(base, self.app.store.clone(), code))
      }
      None => base,
    };

    let invoice = Invoice {
      amount,
      description,
      meta: Meta { user_id, tariff_id, topup, promo_code, payment_code },
    };

    let timeout = self.app.config.gateway_timeout;
    let initiated = time::timeout(timeout, channel.initiate(invoice))
      .await
      .map_err(|_| Error::GatewayTransient("invoice timed out".into()))??;

    info!(
      reference = initiated.reference,
      user = user_id,
      amount = initiated.amount,
      "Payment initiated"
    );
    Ok(initiated)
  }

  pub async fn confirm_payment(&self, reference: &str) -> Result<Confirmation> {
    Activator::new(self.app).confirm(reference).await
  }

  pub async fn activate_free(
    &self,
    user_id: i64,
    tariff_id: i32,
  ) -> Result<subscription::Model> {
    Activator::new(self.app).activate_free(user_id, tariff_id).await
  }

  /// Operator action: lets a payment stuck in support go through activation
  /// once more on the next confirmation.
  pub async fn reopen(&self, reference: &str) -> Result<()> {
    let _lease = self.app.guard.lock(reference).await;

    let owned = reference.to_string();
    let reopened = self
      .app
      .store
      .run(move |txn| {
        let reference = owned.clone();
        Box::pin(async move {
          sv::Payment::new(txn)
            .transition(&reference, PaymentStatus::Support, PaymentStatus::Paid)
            .await
        })
      })
      .await?;

    if !reopened {
      return Err(Error::validation("payment is not waiting for support"));
    }
    info!(reference, "Payment reopened by operator");
    Ok(())
  }

  /// Bans the user and revokes the panel clients of its subscriptions.
  pub async fn ban(&self, tg_user_id: i64) -> Result<usize> {
    let subscriptions = self
      .app
      .store
      .run(move |txn| {
        Box::pin(async move {
          sv::User::new(txn).set_enabled(tg_user_id, false).await
        })
      })
      .await?;

    let mut revoked = 0;
    for sub in &subscriptions {
      let tariff_id = sub.tariff_id;
      let resolved = self
        .app
        .store
        .read(move |db| {
          Box::pin(async move { sv::Catalog::new(db).resolve(tariff_id).await })
        })
        .await;

      let (tariff, server) = match resolved {
        Ok(resolved) => resolved,
        Err(err) => {
          warn!(subscription = sub.id, "Cannot revoke credential: {err}");
          continue;
        }
      };

      let variant = Variant::for_tariff(&tariff);
      let panel = &self.app.panel;
      match panel.revoke_credential(&server, variant, &sub.client_id).await {
        Ok(()) => revoked += 1,
        Err(err) => warn!(subscription = sub.id, "Revoke failed: {err}"),
      }
    }

    info!(user = tg_user_id, revoked, "User banned");
    Ok(revoked)
  }

  pub async fn unban(&self, tg_user_id: i64) -> Result<()> {
    self
      .app
      .store
      .run(move |txn| {
        Box::pin(async move {
          sv::User::new(txn).set_enabled(tg_user_id, true).await?;
          Ok(())
        })
      })
      .await?;

    info!(user = tg_user_id, "User unbanned");
    Ok(())
  }

  /// Returns the sender's remaining balance.
  pub async fn transfer(&self, from: i64, to: i64, amount: i64) -> Result<i64> {
    self
      .app
      .store
      .run(move |txn| {
        Box::pin(async move {
          sv::User::new(txn).require_enabled(from).await?;
          sv::Ledger::new(txn).transfer(from, to, amount).await
        })
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use tokio_test::{assert_err, assert_ok};

  use super::*;
  use crate::{
    entity::TariffKind,
    gateway::{BalanceGateway, Gateways, Status},
    testing::{self, FakeNotifier, FakePanel, Fixture, PanelMode},
  };

  fn buy(user_id: i64, tariff_id: i32, gateway: GatewayKind) -> PaymentRequest {
    PaymentRequest {
      user_id,
      purchase: Purchase::Tariff(tariff_id),
      gateway,
      promo_code: None,
      payment_code: None,
    }
  }

  async fn subscriptions(fx: &Fixture, user: i64) -> Vec<subscription::Model> {
    sv::Subscription::new(&fx.db).by_user(user, true).await.unwrap()
  }

  async fn balance(fx: &Fixture, user: i64) -> i64 {
    sv::Ledger::new(&fx.db).sum(user).await.unwrap()
  }

  #[tokio::test]
  async fn concurrent_confirms_activate_once() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    testing::deposit(&fx.db, 1, 100_000).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;

    let checkout = fx.app.checkout();
    let initiated = checkout
      .initiate_payment(buy(1, tariff.id, GatewayKind::Balance))
      .await
      .unwrap();

    let tasks = (0..8).map(|_| {
      let (app, reference) = (fx.app.clone(), initiated.reference.clone());
      tokio::spawn(async move { app.checkout().confirm_payment(&reference).await })
    });
    let results = futures::future::join_all(tasks).await;

    let ids: Vec<i32> = results
      .into_iter()
      .map(|joined| match joined.unwrap().unwrap() {
        Confirmation::Activated { subscription } => subscription.id,
        other => panic!("unexpected outcome {other:?}"),
      })
      .collect();

    assert!(ids.iter().all(|&id| id == ids[0]));
    assert_eq!(subscriptions(&fx, 1).await.len(), 1);
    assert_eq!(fx.panel.calls(), 1);
    assert_eq!(balance(&fx, 1).await, 50_000);
    assert!(fx.app.guard.is_empty());
  }

  #[tokio::test]
  async fn failed_provisioning_refunds_balance() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    testing::deposit(&fx.db, 1, 100_000).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;
    fx.panel.set_mode(PanelMode::Failing);

    let checkout = fx.app.checkout();
    let initiated = checkout
      .initiate_payment(buy(1, tariff.id, GatewayKind::Balance))
      .await
      .unwrap();
    assert_eq!(balance(&fx, 1).await, 50_000);

    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert_eq!(assert_ok!(outcome), Confirmation::Compensated);
    assert_eq!(balance(&fx, 1).await, 100_000);

    // settled: no second provisioning attempt, no second refund
    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert_eq!(assert_ok!(outcome), Confirmation::Compensated);
    assert_eq!(fx.panel.calls(), 1);
    assert_eq!(balance(&fx, 1).await, 100_000);

    assert!(subscriptions(&fx, 1).await.is_empty());
    assert!(fx.notifier.to_user(1)[0].contains("returned"));
    assert!(fx.notifier.to_admin()[0].contains("Activation failed"));
  }

  #[tokio::test]
  async fn external_payment_waits_for_operator_after_timeout() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;

    let checkout = fx.app.checkout();
    let initiated = checkout
      .initiate_payment(buy(1, tariff.id, GatewayKind::YooKassa))
      .await
      .unwrap();
    assert!(initiated.reference.starts_with("yookassa:"));
    assert!(initiated.redirect.is_some());

    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert_eq!(assert_ok!(outcome), Confirmation::Pending);

    fx.provider.set_status(Status::Paid);
    fx.panel.set_mode(PanelMode::Hanging);

    for _ in 0..2 {
      let outcome = checkout.confirm_payment(&initiated.reference).await;
      assert_eq!(assert_ok!(outcome), Confirmation::Support);
    }
    assert_eq!(fx.panel.calls(), 1);
    assert!(subscriptions(&fx, 1).await.is_empty());
    assert_eq!(balance(&fx, 1).await, 0);
    assert!(fx.notifier.to_user(1)[0].contains("contact support"));

    fx.panel.set_mode(PanelMode::Healthy);
    assert_ok!(checkout.reopen(&initiated.reference).await);
    assert_err!(checkout.reopen(&initiated.reference).await);

    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert!(matches!(assert_ok!(outcome), Confirmation::Activated { .. }));
    assert_eq!(fx.panel.calls(), 2);
  }

  #[tokio::test]
  async fn rejected_external_payment_fails() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;

    let checkout = fx.app.checkout();
    let initiated = checkout
      .initiate_payment(buy(1, tariff.id, GatewayKind::YooKassa))
      .await
      .unwrap();

    fx.provider.set_status(Status::Failed);
    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert_eq!(assert_ok!(outcome), Confirmation::Failed);

    // terminal even if the provider changes its mind
    fx.provider.set_status(Status::Paid);
    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert_eq!(assert_ok!(outcome), Confirmation::Failed);
    assert_eq!(fx.panel.calls(), 0);
  }

  #[tokio::test]
  async fn rejected_status_lookup_keeps_payment_pending() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;

    let checkout = fx.app.checkout();
    let initiated = checkout
      .initiate_payment(buy(1, tariff.id, GatewayKind::YooKassa))
      .await
      .unwrap();

    // the customer paid, but our credentials were refused on the lookup
    fx.provider.set_status(Status::Paid);
    fx.provider.reject_next_lookup("401 Unauthorized");
    let err = assert_err!(checkout.confirm_payment(&initiated.reference).await);
    assert!(matches!(err, Error::GatewayTransient(_)));

    let payment = sv::Payment::new(&fx.db)
      .by_reference(&initiated.reference)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(fx.app.guard.is_empty());

    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert!(matches!(assert_ok!(outcome), Confirmation::Activated { .. }));
    assert_eq!(subscriptions(&fx, 1).await.len(), 1);
  }

  #[tokio::test]
  async fn processes_sharing_a_database_activate_once() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    testing::deposit(&fx.db, 1, 100_000).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;

    // a second process: own guard and panel client, same database
    let panel = Arc::new(FakePanel::new());
    let store = fx.app.store.clone();
    let other = AppState::from_parts(
      store.clone(),
      testing::config(),
      Gateways::new().register(BalanceGateway::new(store)),
      panel.clone(),
      Arc::new(FakeNotifier::default()),
    );
    fx.panel.set_mode(PanelMode::Slow);
    panel.set_mode(PanelMode::Slow);

    let initiated = fx
      .app
      .checkout()
      .initiate_payment(buy(1, tariff.id, GatewayKind::Balance))
      .await
      .unwrap();

    let reference = initiated.reference.as_str();
    let (first_checkout, second_checkout) = (fx.app.checkout(), other.checkout());
    let (first, second) = tokio::join!(
      first_checkout.confirm_payment(reference),
      second_checkout.confirm_payment(reference),
    );

    let activated = |outcome: Result<Confirmation>| match assert_ok!(outcome) {
      Confirmation::Activated { subscription } => subscription.id,
      other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(activated(first), activated(second));

    assert_eq!(subscriptions(&fx, 1).await.len(), 1);
    assert_eq!(fx.panel.calls() + panel.calls(), 2);
    // the loser cleans up the credential it created
    let revoked = [fx.panel.revoked(), panel.revoked()].concat();
    assert_eq!(revoked, vec!["client-1".to_string()]);
    assert_eq!(balance(&fx, 1).await, 50_000);
  }

  #[tokio::test]
  async fn topup_is_credited_once() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;

    let checkout = fx.app.checkout();
    let mut request = buy(1, 0, GatewayKind::YooKassa);
    request.purchase = Purchase::TopUp(25_000);
    let initiated = checkout.initiate_payment(request.clone()).await.unwrap();

    // the pending marker does not count
    assert_eq!(balance(&fx, 1).await, 0);

    fx.provider.set_status(Status::Paid);
    for _ in 0..2 {
      let outcome = checkout.confirm_payment(&initiated.reference).await;
      assert_eq!(
        assert_ok!(outcome),
        Confirmation::Deposited { amount: 25_000, balance: 25_000 }
      );
    }
    assert_eq!(balance(&fx, 1).await, 25_000);
    assert_eq!(fx.panel.calls(), 0);

    request.gateway = GatewayKind::Balance;
    let err = checkout.initiate_payment(request).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[tokio::test]
  async fn half_promo_is_redeemed_on_activation() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    testing::deposit(&fx.db, 1, 100_000).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;
    sv::Pricing::new(&fx.db).create_promo("HALF", 50, 1).await.unwrap();

    let checkout = fx.app.checkout();
    let mut request = buy(1, tariff.id, GatewayKind::Balance);
    request.promo_code = Some("HALF".into());

    let initiated = checkout.initiate_payment(request.clone()).await.unwrap();
    assert_eq!(initiated.amount, 25_000);

    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert!(matches!(assert_ok!(outcome), Confirmation::Activated { .. }));
    assert_eq!(balance(&fx, 1).await, 75_000);

    let err = checkout.initiate_payment(request).await.unwrap_err();
    assert!(matches!(err, Error::Promo(Promo::Exhausted)));
  }

  #[tokio::test]
  async fn code_is_restored_when_provisioning_fails() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    testing::seed_payment_code(&fx.db, "GIFT", 50_000).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;
    fx.panel.set_mode(PanelMode::Failing);

    let checkout = fx.app.checkout();
    let mut request = buy(1, tariff.id, GatewayKind::Code);
    request.payment_code = Some("GIFT".into());

    let initiated = checkout.initiate_payment(request.clone()).await.unwrap();
    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert_eq!(assert_ok!(outcome), Confirmation::Compensated);

    // the code works again
    fx.panel.set_mode(PanelMode::Healthy);
    let initiated = checkout.initiate_payment(request).await.unwrap();
    let outcome = checkout.confirm_payment(&initiated.reference).await;
    assert!(matches!(assert_ok!(outcome), Confirmation::Activated { .. }));
  }

  #[tokio::test]
  async fn activation_issues_tickets_and_pays_referrer() {
    let fx = testing::app().await;
    let checkout = fx.app.checkout();
    let referrer = checkout.register(1, None, None).await.unwrap();
    checkout
      .register(2, None, Some(referrer.referral_code.clone()))
      .await
      .unwrap();
    testing::deposit(&fx.db, 2, 50_000).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 62).await;
    let raffle = sv::Raffle::new(&fx.db).create("Spring").await.unwrap();

    let initiated = checkout
      .initiate_payment(buy(2, tariff.id, GatewayKind::Balance))
      .await
      .unwrap();
    assert_ok!(checkout.confirm_payment(&initiated.reference).await);

    let tickets = sv::Raffle::new(&fx.db).tickets_of(raffle.id, 2).await.unwrap();
    assert_eq!(tickets.len(), 3);
    assert_eq!(balance(&fx, 1).await, 5_000);
    assert!(fx.notifier.to_user(1).iter().any(|m| m.contains("friends")));
  }

  #[tokio::test]
  async fn trial_is_taken_once() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    let (trial, _) =
      testing::seed_tariff_of(&fx.db, TariffKind::Trial, 0, 3).await;
    let (regular, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;

    let checkout = fx.app.checkout();
    let subscription = assert_ok!(checkout.activate_free(1, trial.id).await);
    assert!(subscription.payment_reference.is_none());

    let err = checkout.activate_free(1, trial.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let err = checkout.activate_free(1, regular.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert_eq!(fx.panel.calls(), 1);
    assert!(sv::User::new(&fx.db).by_id(1).await.unwrap().unwrap().trial_used);
  }

  #[tokio::test]
  async fn ban_revokes_and_blocks_payments() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    testing::deposit(&fx.db, 1, 100_000).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;

    let checkout = fx.app.checkout();
    let initiated = checkout
      .initiate_payment(buy(1, tariff.id, GatewayKind::Balance))
      .await
      .unwrap();
    let Confirmation::Activated { subscription } =
      checkout.confirm_payment(&initiated.reference).await.unwrap()
    else {
      panic!("expected activation");
    };

    assert_eq!(checkout.ban(1).await.unwrap(), 1);
    assert_eq!(fx.panel.revoked(), vec![subscription.client_id]);

    let err = checkout
      .initiate_payment(buy(1, tariff.id, GatewayKind::Balance))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::UserDisabled));

    checkout.unban(1).await.unwrap();
    assert_ok!(
      checkout
        .initiate_payment(buy(1, tariff.id, GatewayKind::Balance))
        .await
    );
  }

  #[tokio::test]
  async fn transfer_moves_balance() {
    let fx = testing::app().await;
    testing::seed_user(&fx.db, 1).await;
    testing::seed_user(&fx.db, 2).await;
    testing::deposit(&fx.db, 1, 10_000).await;

    let checkout = fx.app.checkout();
    assert_eq!(checkout.transfer(1, 2, 4_000).await.unwrap(), 6_000);
    assert_eq!(balance(&fx, 2).await, 4_000);

    let err = checkout.transfer(1, 2, 50_000).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { .. }));
  }
}
