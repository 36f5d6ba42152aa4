//! Turns a confirmed payment into exactly one subscription.
//!
//! Per payment reference:
//! `pending -> paid -> activated`, `pending -> paid -> compensated`,
//! `pending -> paid -> support` or `pending -> failed`.

use serde::Serialize;

use super::guard::Guard;
use crate::{
  entity::{
    PaymentStatus, TariffKind, TransactionType, payment, server, subscription,
    tariff,
  },
  gateway::{Compensation, Gateway, Status},
  notify::{self, Notifier},
  prelude::*,
  provision::{Credential, Owner, Provisioner, Variant},
  state::AppState,
  sv::{self, subscription::NewSubscription},
};

/// Outcome of a confirmation attempt. Repeating the call yields the same
/// outcome once the payment has settled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Confirmation {
  Activated { subscription: subscription::Model },
  Deposited { amount: i64, balance: i64 },
  /// Provider has not captured the money yet
  Pending,
  Failed,
  /// Provisioning failed and the money went back to where it came from
  Compensated,
  /// Money captured externally but nothing provisioned; an operator has to
  /// reopen the payment
  Support,
}

pub struct Activator<'a> {
  app: &'a AppState,
}

impl<'a> Activator<'a> {
  pub fn new(app: &'a AppState) -> Self {
    Self { app }
  }

  fn guard(&self) -> &Guard {
    &self.app.guard
  }

  pub async fn confirm(&self, reference: &str) -> Result<Confirmation> {
    let _lease = self.guard().lock(reference).await;

    let mut payment = self.payment(reference).await?;
    if let Some(done) = self.settled(&payment).await? {
      debug!(reference, "Payment already settled");
      return Ok(done);
    }

    match payment.status {
      PaymentStatus::Failed => return Ok(Confirmation::Failed),
      PaymentStatus::Compensated => return Ok(Confirmation::Compensated),
      PaymentStatus::Support => return Ok(Confirmation::Support),
      PaymentStatus::Activated => {
        error!(reference, "Payment is activated but nothing was delivered");
        return Err(Error::NotFound("subscription"));
      }
      PaymentStatus::Pending | PaymentStatus::Paid => {}
    }

    let gateway = self.app.gateways.get(payment.gateway)?;

    if payment.status == PaymentStatus::Pending {
      let status = time::timeout(
        self.app.config.gateway_timeout,
        gateway.poll(reference),
      )
      .await
      .map_err(|_| Error::GatewayTransient("status check timed out".into()))??;

      match status {
        Status::Pending => return Ok(Confirmation::Pending),
        Status::Failed => {
          self.transition(reference, PaymentStatus::Failed).await?;
          info!(reference, "Payment failed");
          return Ok(Confirmation::Failed);
        }
        Status::Paid => {
          self.transition(reference, PaymentStatus::Paid).await?;
          payment.status = PaymentStatus::Paid;
          info!(reference, user = payment.user_id, "Payment captured");
        }
      }
    }

    if payment.topup {
      return self.deposit(&payment).await;
    }
    self.activate(&payment, gateway).await
  }

  async fn payment(&self, reference: &str) -> Result<payment::Model> {
    let reference = reference.to_string();
    self
      .app
      .store
      .read(move |db| {
        let reference = reference.clone();
        Box::pin(async move { sv::Payment::new(db).require(&reference).await })
      })
      .await
  }

  /// Durable record of a previous success, if any.
  async fn settled(
    &self,
    payment: &payment::Model,
  ) -> Result<Option<Confirmation>> {
    let (reference, user, topup) =
      (payment.reference.clone(), payment.user_id, payment.topup);

    self
      .app
      .store
      .read(move |db| {
        let reference = reference.clone();
        Box::pin(async move {
          if topup {
            let ledger = sv::Ledger::new(db);
            let Some(row) =
              ledger.by_reference(&reference, TransactionType::Deposit).await?
            else {
              return Ok(None);
            };
            let balance = ledger.sum(user).await?;
            let amount = row.amount;
            return Ok(Some(Confirmation::Deposited { amount, balance }));
          }

          let subscription =
            sv::Subscription::new(db).by_reference(&reference).await?;
          Ok(subscription.map(|subscription| Confirmation::Activated {
            subscription,
          }))
        })
      })
      .await
  }

  async fn transition(&self, reference: &str, to: PaymentStatus) -> Result<()> {
    let reference = reference.to_string();
    self
      .app
      .store
      .run(move |txn| {
        let reference = reference.clone();
        Box::pin(async move {
          let from = PaymentStatus::Pending;
          sv::Payment::new(txn).transition(&reference, from, to).await?;
          Ok(())
        })
      })
      .await
  }

  async fn deposit(&self, payment: &payment::Model) -> Result<Confirmation> {
    let payment = payment.clone();
    let (user, amount) = (payment.user_id, payment.amount);

    let result = self
      .app
      .store
      .run(|txn| {
        let payment = payment.clone();
        Box::pin(async move {
          let ledger = sv::Ledger::new(txn);
          ledger
            .post(
              payment.user_id,
              payment.amount,
              TransactionType::Deposit,
              format!("Top-up via {}", payment.gateway),
              Some(payment.reference.clone()),
            )
            .await?;
          sv::Payment::new(txn)
            .set_status(&payment.reference, PaymentStatus::Activated)
            .await?;
          ledger.sum(payment.user_id).await
        })
      })
      .await;

    match result {
      Ok(balance) => {
        info!(reference = payment.reference, user, amount, "Balance topped up");
        let text = notify::deposited(amount, balance);
        self.app.notifier.notify_user(user, &text).await;
        if self.app.config.notify_admin_payments {
          let text = notify::admin_payment(&payment, None);
          self.app.notifier.notify_admin_channel(&text).await;
        }
        Ok(Confirmation::Deposited { amount, balance })
      }
      Err(err) if err.is_unique_violation() => self
        .settled(&payment)
        .await?
        .ok_or(Error::NotFound("deposit")),
      Err(err) => Err(err),
    }
  }

  async fn resolve(
    &self,
    tariff_id: i32,
  ) -> Result<(tariff::Model, server::Model)> {
    self
      .app
      .store
      .read(move |db| {
        Box::pin(async move { sv::Catalog::new(db).resolve(tariff_id).await })
      })
      .await
  }

  /// The one remote call that creates a client on the panel. Never retried.
  async fn provision(
    &self,
    server: &server::Model,
    variant: Variant,
    owner: &Owner,
  ) -> Result<Credential> {
    time::timeout(
      self.app.config.provision_timeout,
      self.app.panel.create_credential(server, variant, owner),
    )
    .await
    .unwrap_or_else(|_| Err(Error::Provisioning("panel timed out".into())))
  }

  async fn revoke(
    &self,
    server: &server::Model,
    variant: Variant,
    credential: &Credential,
  ) {
    let revoke =
      self.app.panel.revoke_credential(server, variant, &credential.client_id);
    if let Err(err) = revoke.await {
      warn!(
        server = server.name,
        client_id = credential.client_id,
        "Failed to revoke orphaned credential: {err}"
      );
    }
  }

  async fn activate(
    &self,
    payment: &payment::Model,
    gateway: Arc<dyn Gateway>,
  ) -> Result<Confirmation> {
    let tariff_id = payment
      .tariff_id
      .ok_or_else(|| Error::validation("payment has no tariff"))?;
    let (tariff, server) = self.resolve(tariff_id).await?;

    let variant = Variant::for_tariff(&tariff);
    let owner = Owner {
      tg_user_id: payment.user_id,
      expires_at: utils::now() + TimeDelta::days(i64::from(tariff.days)),
    };

    let credential = match self.provision(&server, variant, &owner).await {
      Ok(credential) => credential,
      Err(err) => return self.fail(payment, &tariff, gateway, err).await,
    };

    match self.commit(payment, &tariff, &credential).await {
      Ok(subscription) => {
        info!(
          reference = payment.reference,
          user = payment.user_id,
          tariff = tariff.id,
          "Subscription activated"
        );
        self.delivered(payment, &tariff, &subscription).await;
        Ok(Confirmation::Activated { subscription })
      }
      Err(err) if err.is_unique_violation() => {
        warn!(reference = payment.reference, "Lost activation race");
        self.revoke(&server, variant, &credential).await;
        self.settled(payment).await?.ok_or(Error::NotFound("subscription"))
      }
      Err(err) => {
        error!(
          reference = payment.reference,
          user = payment.user_id,
          tariff = tariff.id,
          "Could not store subscription: {err}"
        );
        self.revoke(&server, variant, &credential).await;
        Err(err)
      }
    }
  }

  /// Subscription row, status flip, promo redemption and raffle tickets,
  /// all in one transaction.
  async fn commit(
    &self,
    payment: &payment::Model,
    tariff: &tariff::Model,
    credential: &Credential,
  ) -> Result<subscription::Model> {
    let payment = payment.clone();
    let tariff = tariff.clone();
    let credential = credential.clone();

    self
      .app
      .store
      .run(|txn| {
        let (payment, tariff, credential) =
          (payment.clone(), tariff.clone(), credential.clone());

        Box::pin(async move {
          let reference = payment.reference.clone();
          let subscription = sv::Subscription::new(txn)
            .create(NewSubscription {
              user_id: payment.user_id,
              tariff_id: tariff.id,
              server_id: tariff.server_id,
              days: tariff.days,
              credential: credential.link,
              client_id: credential.client_id,
              payment_reference: Some(reference.clone()),
            })
            .await?;

          sv::Payment::new(txn)
            .set_status(&reference, PaymentStatus::Activated)
            .await?;

          if let Some(code) = &payment.promo_code {
            sv::Pricing::new(txn).redeem_promo(code).await?;
          }

          if !tariff.is_free() {
            let raffles = sv::Raffle::new(txn);
            if let Some(raffle) = raffles.active().await? {
              let count = sv::raffle::tickets_for_days(tariff.days);
              raffles
                .issue(raffle.id, payment.user_id, count, Some(&reference))
                .await?;
            }
          }

          Ok(subscription)
        })
      })
      .await
  }

  /// Provisioning failed after the money was captured.
  async fn fail(
    &self,
    payment: &payment::Model,
    tariff: &tariff::Model,
    gateway: Arc<dyn Gateway>,
    err: Error,
  ) -> Result<Confirmation> {
    error!(
      reference = payment.reference,
      user = payment.user_id,
      tariff = tariff.id,
      gateway = %payment.gateway,
      "Provisioning failed: {err}"
    );

    let notifier = &self.app.notifier;
    notifier
      .notify_admin_channel(&notify::admin_incident(payment, &err.to_string()))
      .await;

    if payment.gateway.is_external() {
      self.park(&payment.reference).await?;
      let text = notify::support(&payment.reference);
      notifier.notify_user(payment.user_id, &text).await;
      return Ok(Confirmation::Support);
    }

    let snapshot = payment.clone();
    let compensation = self
      .app
      .store
      .run(|txn| {
        let (gateway, payment) = (gateway.clone(), snapshot.clone());
        Box::pin(async move {
          let compensation = gateway.compensate(txn, &payment).await?;
          sv::Payment::new(txn)
            .set_status(&payment.reference, PaymentStatus::Compensated)
            .await?;
          Ok(compensation)
        })
      })
      .await?;

    let text = match compensation {
      Compensation::Refunded(amount) => notify::refunded(amount),
      Compensation::CodeRestored(_) => notify::code_restored(),
      Compensation::Manual => notify::support(&payment.reference),
    };
    notifier.notify_user(payment.user_id, &text).await;

    info!(reference = payment.reference, ?compensation, "Payment compensated");
    Ok(Confirmation::Compensated)
  }

  async fn park(&self, reference: &str) -> Result<()> {
    let reference = reference.to_string();
    self
      .app
      .store
      .run(move |txn| {
        let reference = reference.clone();
        Box::pin(async move {
          sv::Payment::new(txn)
            .transition(&reference, PaymentStatus::Paid, PaymentStatus::Support)
            .await?;
          Ok(())
        })
      })
      .await
  }

  /// Post-commit side effects. None of them can undo the activation.
  async fn delivered(
    &self,
    payment: &payment::Model,
    tariff: &tariff::Model,
    subscription: &subscription::Model,
  ) {
    let notifier = &self.app.notifier;
    notifier
      .notify_user(payment.user_id, &notify::activated(tariff, subscription))
      .await;

    if self.app.config.notify_admin_payments {
      let text = notify::admin_payment(payment, Some(&tariff.name));
      notifier.notify_admin_channel(&text).await;
    }

    let (buyer, thresholds) =
      (payment.user_id, self.app.config.referral_thresholds.clone());
    let rewards = self
      .app
      .store
      .run(|txn| {
        let thresholds = thresholds.clone();
        Box::pin(async move {
          let referral = sv::Referral::new(txn);
          let paid = referral.evaluate(buyer, &thresholds).await?;
          let referrer = sv::User::new(txn)
            .by_id(buyer)
            .await?
            .and_then(|user| user.referred_by);
          Ok((referrer, paid))
        })
      })
      .await;

    match rewards {
      Ok((Some(referrer), paid)) => {
        for threshold in paid {
          let text =
            notify::referral_reward(threshold.reward, threshold.referrals);
          notifier.notify_user(referrer, &text).await;
        }
      }
      Ok((None, _)) => {}
      Err(err) => warn!(buyer, "Referral evaluation failed: {err}"),
    }
  }

  /// Trial and promo tariffs: no payment, no tickets, one per user.
  pub async fn activate_free(
    &self,
    user_id: i64,
    tariff_id: i32,
  ) -> Result<subscription::Model> {
    let key = format!("free:{user_id}:{tariff_id}");
    let _lease = self.guard().lock(&key).await;

    let (user, tariff, server, taken) = self
      .app
      .store
      .read(move |db| {
        Box::pin(async move {
          let user = sv::User::new(db).require_enabled(user_id).await?;
          let (tariff, server) =
            sv::Catalog::new(db).resolve_enabled(tariff_id).await?;
          let taken = sv::Subscription::new(db)
            .has_for_tariff(user_id, tariff_id)
            .await?;
          Ok((user, tariff, server, taken))
        })
      })
      .await?;

    match tariff.kind {
      TariffKind::Regular => {
        return Err(Error::validation("this tariff has to be paid for"));
      }
      TariffKind::Trial if user.trial_used => {
        return Err(Error::validation("trial has already been used"));
      }
      TariffKind::Promo if taken => {
        return Err(Error::validation("promo tariff has already been taken"));
      }
      TariffKind::Trial | TariffKind::Promo => {}
    }

    let variant = Variant::for_tariff(&tariff);
    let owner = Owner {
      tg_user_id: user_id,
      expires_at: utils::now() + TimeDelta::days(i64::from(tariff.days)),
    };

    let credential = match self.provision(&server, variant, &owner).await {
      Ok(credential) => credential,
      Err(err) => {
        error!(
          user = user_id,
          tariff = tariff.id,
          "Provisioning failed: {err}"
        );
        return Err(err);
      }
    };

    let stored = {
      let (kind, days, server_id) = (tariff.kind, tariff.days, tariff.server_id);
      let credential = credential.clone();

      self
        .app
        .store
        .run(|txn| {
          let credential = credential.clone();
          Box::pin(async move {
            if kind == TariffKind::Trial
              && !sv::User::new(txn).mark_trial_used(user_id).await?
            {
              return Err(Error::validation("trial has already been used"));
            }
            sv::Subscription::new(txn)
              .create(NewSubscription {
                user_id,
                tariff_id,
                server_id,
                days,
                credential: credential.link,
                client_id: credential.client_id,
                payment_reference: None,
              })
              .await
          })
        })
        .await
    };

    match stored {
      Ok(subscription) => {
        info!(user = user_id, tariff = tariff.id, ?variant, "Free activation");
        self
          .app
          .notifier
          .notify_user(user_id, &notify::activated(&tariff, &subscription))
          .await;
        Ok(subscription)
      }
      Err(err) => {
        self.revoke(&server, variant, &credential).await;
        Err(err)
      }
    }
  }
}
