use sea_orm::sea_query::Expr;
use uuid::Uuid;

use super::{Compensation, Gateway, Initiated, Invoice, Status};
use crate::{
  entity::{GatewayKind, PaymentStatus, payment, payment_code},
  prelude::*,
  store::Store,
  sv::{self, payment::NewPayment},
};

/// Single-use stored-value codes. The code is consumed on the first
/// successful poll, not at initiation.
pub struct CodeGateway {
  store: Store,
}

impl CodeGateway {
  pub fn new(store: Store) -> Self {
    Self { store }
  }
}

#[async_trait]
impl Gateway for CodeGateway {
  fn kind(&self) -> GatewayKind {
    GatewayKind::Code
  }

  async fn initiate(&self, invoice: Invoice) -> Result<Initiated> {
    let Invoice { amount, meta, .. } = invoice;
    let code = meta
      .payment_code
      .clone()
      .ok_or_else(|| Error::validation("payment code is required"))?;
    if meta.topup {
      return Err(Error::validation("payment codes pay for tariffs only"));
    }

    let reference = self.kind().reference(Uuid::new_v4().simple());

    self
      .store
      .run(|txn| {
        let code = code.clone();
        let new = NewPayment {
          reference: reference.clone(),
          gateway: GatewayKind::Code,
          user_id: meta.user_id,
          tariff_id: meta.tariff_id,
          amount,
          topup: false,
          promo_code: meta.promo_code.clone(),
          payment_code: Some(code.clone()),
          status: PaymentStatus::Pending,
          redirect_url: None,
        };

        Box::pin(async move {
          let stored = payment_code::Entity::find_by_id(code.as_str())
            .one(txn)
            .await?
            .filter(|stored| stored.is_enabled)
            .ok_or_else(|| Error::validation("payment code is invalid or used"))?;

          if stored.amount < amount {
            return Err(Error::validation(format!(
              "payment code covers {} of {}",
              utils::format_money(stored.amount),
              utils::format_money(amount),
            )));
          }

          sv::Payment::new(txn).create(new).await?;
          Ok(())
        })
      })
      .await?;

    Ok(Initiated { reference, redirect: None, status: Status::Pending, amount })
  }

  async fn poll(&self, reference: &str) -> Result<Status> {
    let reference = reference.to_string();

    self
      .store
      .run(move |txn| {
        let reference = reference.clone();

        Box::pin(async move {
          let payments = sv::Payment::new(txn);
          let payment = payments.require(&reference).await?;

          match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Failed => return Ok(Status::Failed),
            _ => return Ok(Status::Paid),
          }

          let code = payment
            .payment_code
            .ok_or_else(|| Error::validation("payment carries no code"))?;

          let consumed = payment_code::Entity::update_many()
            .col_expr(payment_code::Column::IsEnabled, Expr::value(false))
            .filter(payment_code::Column::Code.eq(code.as_str()))
            .filter(payment_code::Column::IsEnabled.eq(true))
            .exec(txn)
            .await?
            .rows_affected
            == 1;

          if consumed {
            payments
              .transition(&reference, PaymentStatus::Pending, PaymentStatus::Paid)
              .await?;
            Ok(Status::Paid)
          } else {
            warn!(reference, code, "Payment code was used elsewhere");
            payments
              .transition(&reference, PaymentStatus::Pending, PaymentStatus::Failed)
              .await?;
            Ok(Status::Failed)
          }
        })
      })
      .await
  }

  async fn compensate(
    &self,
    txn: &DatabaseTransaction,
    payment: &payment::Model,
  ) -> Result<Compensation> {
    let code = payment
      .payment_code
      .clone()
      .ok_or_else(|| Error::validation("payment carries no code"))?;

    payment_code::Entity::update_many()
      .col_expr(payment_code::Column::IsEnabled, Expr::value(true))
      .filter(payment_code::Column::Code.eq(code.as_str()))
      .exec(txn)
      .await?;

    info!(reference = payment.reference, code, "Payment code re-enabled");
    Ok(Compensation::CodeRestored(code))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{gateway::Meta, testing};

  fn invoice(amount: i64, code: &str) -> Invoice {
    Invoice {
      amount,
      description: "Tariff".into(),
      meta: Meta {
        user_id: 1,
        tariff_id: Some(1),
        payment_code: Some(code.into()),
        ..Default::default()
      },
    }
  }

  #[tokio::test]
  async fn code_is_consumed_once_and_restorable() {
    let db = testing::db().await;
    testing::seed_user(&db, 1).await;
    testing::seed_payment_code(&db, "GIFT", 50_000).await;
    let gateway = CodeGateway::new(testing::store(&db));

    let first = gateway.initiate(invoice(50_000, "GIFT")).await.unwrap();
    let second = gateway.initiate(invoice(50_000, "GIFT")).await.unwrap();

    assert_eq!(gateway.poll(&first.reference).await.unwrap(), Status::Paid);
    assert_eq!(gateway.poll(&first.reference).await.unwrap(), Status::Paid);
    assert_eq!(gateway.poll(&second.reference).await.unwrap(), Status::Failed);

    let payment = sv::Payment::new(&db).require(&first.reference).await.unwrap();
    let txn = db.begin().await.unwrap();
    let outcome = gateway.compensate(&txn, &payment).await.unwrap();
    txn.commit().await.unwrap();
    assert_eq!(outcome, Compensation::CodeRestored("GIFT".into()));

    let code = payment_code::Entity::find_by_id("GIFT").one(&db).await.unwrap();
    assert!(code.unwrap().is_enabled);
  }

  #[tokio::test]
  async fn code_must_cover_price() {
    let db = testing::db().await;
    testing::seed_user(&db, 1).await;
    testing::seed_payment_code(&db, "SMALL", 10_000).await;
    let gateway = CodeGateway::new(testing::store(&db));

    let err = gateway.initiate(invoice(50_000, "SMALL")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = gateway.initiate(invoice(50_000, "MISSING")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }
}
