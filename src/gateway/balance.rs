use uuid::Uuid;

use super::{Compensation, Gateway, Initiated, Invoice, Status};
use crate::{
  entity::{GatewayKind, PaymentStatus, TransactionType, payment},
  prelude::*,
  store::Store,
  sv::{self, payment::NewPayment},
};

/// Pays from the internal balance. Capture happens inside `initiate`, so the
/// reference it returns is already paid.
pub struct BalanceGateway {
  store: Store,
}

impl BalanceGateway {
  pub fn new(store: Store) -> Self {
    Self { store }
  }
}

#[async_trait]
impl Gateway for BalanceGateway {
  fn kind(&self) -> GatewayKind {
    GatewayKind::Balance
  }

  async fn initiate(&self, invoice: Invoice) -> Result<Initiated> {
    let Invoice { amount, description, meta } = invoice;
    if meta.topup {
      return Err(Error::validation("balance cannot be topped up from itself"));
    }
    if amount < 0 {
      return Err(Error::validation("amount cannot be negative"));
    }

    let reference = self.kind().reference(Uuid::new_v4().simple());

    self
      .store
      .run(|txn| {
        let new = NewPayment {
          reference: reference.clone(),
          gateway: GatewayKind::Balance,
          user_id: meta.user_id,
          tariff_id: meta.tariff_id,
          amount,
          topup: false,
          promo_code: meta.promo_code.clone(),
          payment_code: None,
          status: PaymentStatus::Paid,
          redirect_url: None,
        };
        let description = description.clone();

        Box::pin(async move {
          let user = new.user_id;
          let reference = new.reference.clone();

          sv::Pricing::new(txn).ensure_sufficient(user, amount).await?;
          sv::Payment::new(txn).create(new).await?;
          sv::Ledger::new(txn)
            .post(
              user,
              -amount,
              TransactionType::SubscriptionPayment,
              description,
              Some(reference),
            )
            .await?;
          Ok(())
        })
      })
      .await?;

    info!(reference, user = meta.user_id, amount, "Balance debited");
    Ok(Initiated { reference, redirect: None, status: Status::Paid, amount })
  }

  async fn poll(&self, reference: &str) -> Result<Status> {
    let reference = reference.to_string();
    let payment = self
      .store
      .read(move |db| {
        let reference = reference.clone();
        Box::pin(async move { sv::Payment::new(db).require(&reference).await })
      })
      .await?;

    Ok(match payment.status {
      PaymentStatus::Failed => Status::Failed,
      _ => Status::Paid,
    })
  }

  async fn compensate(
    &self,
    txn: &DatabaseTransaction,
    payment: &payment::Model,
  ) -> Result<Compensation> {
    sv::Ledger::new(txn)
      .post(
        payment.user_id,
        payment.amount,
        TransactionType::Refund,
        "Refund for failed activation",
        Some(payment.reference.clone()),
      )
      .await?;

    info!(reference = payment.reference, amount = payment.amount, "Refunded");
    Ok(Compensation::Refunded(payment.amount))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{gateway::Meta, testing};

  fn invoice(user_id: i64, amount: i64) -> Invoice {
    Invoice {
      amount,
      description: "Tariff".into(),
      meta: Meta { user_id, tariff_id: Some(1), ..Default::default() },
    }
  }

  #[tokio::test]
  async fn insufficient_balance_writes_nothing() {
    let db = testing::db().await;
    testing::seed_user(&db, 1).await;
    testing::deposit(&db, 1, 30_000).await;
    let gateway = BalanceGateway::new(testing::store(&db));

    let err = gateway.initiate(invoice(1, 50_000)).await.unwrap_err();

    assert!(matches!(
      err,
      Error::InsufficientFunds { required: 50_000, available: 30_000 }
    ));
    assert_eq!(sv::Ledger::new(&db).history(1, 10).await.unwrap().len(), 1);
    assert!(sv::Payment::new(&db).by_user(1).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn debit_and_refund_balance_out() {
    let db = testing::db().await;
    testing::seed_user(&db, 1).await;
    testing::deposit(&db, 1, 80_000).await;
    let gateway = BalanceGateway::new(testing::store(&db));

    let initiated = gateway.initiate(invoice(1, 50_000)).await.unwrap();
    assert_eq!(initiated.status, Status::Paid);
    assert_eq!(gateway.poll(&initiated.reference).await.unwrap(), Status::Paid);
    assert_eq!(sv::Ledger::new(&db).sum(1).await.unwrap(), 30_000);

    let payment = sv::Payment::new(&db).require(&initiated.reference).await.unwrap();
    let txn = db.begin().await.unwrap();
    let outcome = gateway.compensate(&txn, &payment).await.unwrap();
    txn.commit().await.unwrap();

    assert_eq!(outcome, Compensation::Refunded(50_000));
    assert_eq!(sv::Ledger::new(&db).sum(1).await.unwrap(), 80_000);
  }
}
