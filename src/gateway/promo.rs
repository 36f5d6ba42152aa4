use super::{Compensation, Gateway, Initiated, Invoice, Status};
use crate::{
  entity::{GatewayKind, payment},
  prelude::*,
  store::Store,
  sv,
};

/// Applies a promo discount to the invoice before handing it to `inner`.
/// The code is validated here and only counted once the payment activates.
pub struct PromoAdjusted {
  inner: Arc<dyn Gateway>,
  store: Store,
  code: String,
}

impl PromoAdjusted {
  pub fn new(inner: Arc<dyn Gateway>, store: Store, code: String) -> Self {
    Self { inner, store, code }
  }
}

#[async_trait]
impl Gateway for PromoAdjusted {
  fn kind(&self) -> GatewayKind {
    self.inner.kind()
  }

  async fn initiate(&self, mut invoice: Invoice) -> Result<Initiated> {
    if invoice.meta.topup {
      return Err(Error::validation("promo codes apply to tariffs only"));
    }

    let (amount, code) = (invoice.amount, self.code.clone());
    let discounted = self
      .store
      .read(move |db| {
        let code = code.clone();
        Box::pin(async move {
          sv::Pricing::new(db).apply(amount, Some(&code)).await
        })
      })
      .await?;

    debug!(code = self.code, amount, discounted, "Promo applied");
    invoice.amount = discounted;
    invoice.meta.promo_code = Some(self.code.clone());
    self.inner.initiate(invoice).await
  }

  async fn poll(&self, reference: &str) -> Result<Status> {
    self.inner.poll(reference).await
  }

  async fn compensate(
    &self,
    txn: &DatabaseTransaction,
    payment: &payment::Model,
  ) -> Result<Compensation> {
    self.inner.compensate(txn, payment).await
  }

  fn webhook_reference(&self, body: &json::Value) -> Option<String> {
    self.inner.webhook_reference(body)
  }
}
