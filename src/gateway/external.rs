use super::{Gateway, Initiated, Invoice, Status};
use crate::{
  config::Config,
  entity::{GatewayKind, PaymentStatus, TransactionType, gateway_config},
  prelude::*,
  store::Store,
  sv::{self, payment::NewPayment},
};

/// Everything a provider call needs.
pub struct ProviderCtx<'a> {
  pub http: &'a reqwest::Client,
  pub config: &'a gateway_config::Model,
  pub currency: &'a str,
  pub return_url: &'a str,
}

impl ProviderCtx<'_> {
  pub fn api_url<'s>(&'s self, default: &'s str) -> &'s str {
    self.config.api_url.as_deref().unwrap_or(default).trim_end_matches('/')
  }

  pub fn account(&self) -> Result<&str> {
    self
      .config
      .account
      .as_deref()
      .ok_or(Error::GatewayUnavailable(self.config.gateway))
  }
}

/// Invoice as registered at the provider.
#[derive(Debug, Clone)]
pub struct Created {
  pub id: String,
  pub redirect: Option<String>,
}

/// One REST payment provider.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
  fn kind(&self) -> GatewayKind;

  async fn create(&self, ctx: &ProviderCtx<'_>, invoice: &Invoice)
  -> Result<Created>;

  async fn status(&self, ctx: &ProviderCtx<'_>, id: &str) -> Result<Status>;

  /// Provider-side invoice id in a webhook body.
  fn webhook_id(&self, body: &json::Value) -> Option<String>;
}

/// Gateway over a provider whose money lands on the merchant account.
pub struct External<P> {
  store: Store,
  http: reqwest::Client,
  currency: String,
  return_url: String,
  provider: P,
}

impl<P: Provider> External<P> {
  pub fn new(
    store: Store,
    http: reqwest::Client,
    config: &Config,
    provider: P,
  ) -> Self {
    Self {
      store,
      http,
      currency: config.currency.clone(),
      return_url: config.return_url.clone(),
      provider,
    }
  }

  async fn config(&self) -> Result<gateway_config::Model> {
    let kind = self.provider.kind();
    self
      .store
      .read(move |db| {
        Box::pin(async move { sv::GatewayConfig::new(db).active(kind).await })
      })
      .await?
      .ok_or(Error::GatewayUnavailable(kind))
  }

  fn ctx<'a>(&'a self, config: &'a gateway_config::Model) -> ProviderCtx<'a> {
    ProviderCtx {
      http: &self.http,
      config,
      currency: &self.currency,
      return_url: &self.return_url,
    }
  }
}

#[async_trait]
impl<P: Provider> Gateway for External<P> {
  fn kind(&self) -> GatewayKind {
    self.provider.kind()
  }

  async fn initiate(&self, invoice: Invoice) -> Result<Initiated> {
    if invoice.amount <= 0 {
      return Err(Error::validation("amount must be positive"));
    }

    let config = self.config().await?;
    let created = self.provider.create(&self.ctx(&config), &invoice).await?;
    let reference = self.kind().reference(&created.id);

    let new = NewPayment {
      reference: reference.clone(),
      gateway: self.kind(),
      user_id: invoice.meta.user_id,
      tariff_id: invoice.meta.tariff_id,
      amount: invoice.amount,
      topup: invoice.meta.topup,
      promo_code: invoice.meta.promo_code.clone(),
      payment_code: None,
      status: PaymentStatus::Pending,
      redirect_url: created.redirect.clone(),
    };

    self
      .store
      .run(|txn| {
        let new = new.clone();
        Box::pin(async move {
          let (user, amount, topup) = (new.user_id, new.amount, new.topup);
          let reference = new.reference.clone();

          sv::Payment::new(txn).create(new).await?;
          if topup {
            sv::Ledger::new(txn)
              .post(
                user,
                amount,
                TransactionType::Pending,
                "Top-up awaiting payment",
                Some(reference),
              )
              .await?;
          }
          Ok(())
        })
      })
      .await?;

    info!(
      reference,
      user = invoice.meta.user_id,
      amount = invoice.amount,
      "Invoice created"
    );
    Ok(Initiated {
      reference,
      redirect: created.redirect,
      status: Status::Pending,
      amount: invoice.amount,
    })
  }

  async fn poll(&self, reference: &str) -> Result<Status> {
    let config = self.config().await?;
    let id = reference
      .split_once(':')
      .map_or(reference, |(_, id)| id);

    // A failed lookup says nothing about the payment itself: only the
    // provider reporting a terminal status may fail it.
    match self.provider.status(&self.ctx(&config), id).await {
      Err(Error::GatewayPermanent(msg)) => {
        warn!(reference, "Status lookup rejected: {msg}");
        Err(Error::GatewayTransient(format!("status lookup rejected: {msg}")))
      }
      other => other,
    }
  }

  fn webhook_reference(&self, body: &json::Value) -> Option<String> {
    self.provider.webhook_id(body).map(|id| self.kind().reference(id))
  }
}
