//! Payment channels behind one interface.
//!
//! Every gateway persists the payment row it creates, so a reference handed
//! back from [`Gateway::initiate`] always exists in storage.

mod balance;
mod code;
mod cryptopay;
mod external;
mod http;
mod promo;
mod psp;
mod yookassa;

pub use balance::BalanceGateway;
pub use code::CodeGateway;
pub use cryptopay::CryptoPay;
pub use external::{Created, External, Provider, ProviderCtx};
pub use promo::PromoAdjusted;
pub use psp::PsPayments;
pub use yookassa::YooKassa;

use serde::Serialize;

use crate::{
  config::Config,
  entity::{GatewayKind, payment},
  prelude::*,
  store::Store,
};

/// Canonical provider state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
  Pending,
  Paid,
  Failed,
}

#[derive(Debug, Clone, Default)]
pub struct Meta {
  pub user_id: i64,
  pub tariff_id: Option<i32>,
  /// Credits the balance instead of buying a tariff
  pub topup: bool,
  pub promo_code: Option<String>,
  pub payment_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Invoice {
  /// Minor units
  pub amount: i64,
  pub description: String,
  pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Initiated {
  pub reference: String,
  pub redirect: Option<String>,
  pub status: Status,
  /// What the user is actually charged
  pub amount: i64,
}

/// What undoing a captured payment amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
  Refunded(i64),
  CodeRestored(String),
  /// Money left the system, an operator has to step in
  Manual,
}

#[async_trait]
pub trait Gateway: Send + Sync {
  fn kind(&self) -> GatewayKind;

  async fn initiate(&self, invoice: Invoice) -> Result<Initiated>;

  async fn poll(&self, reference: &str) -> Result<Status>;

  /// Returns the captured money inside the caller's transaction.
  async fn compensate(
    &self,
    _txn: &DatabaseTransaction,
    _payment: &payment::Model,
  ) -> Result<Compensation> {
    Ok(Compensation::Manual)
  }

  /// Payment reference carried by a provider notification.
  fn webhook_reference(&self, _body: &json::Value) -> Option<String> {
    None
  }
}

#[derive(Clone, Default)]
pub struct Gateways {
  inner: HashMap<GatewayKind, Arc<dyn Gateway>>,
}

impl Gateways {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every channel the shop knows about. External ones fail with
  /// `GatewayUnavailable` until a configuration is activated for them.
  pub fn standard(store: &Store, config: &Config) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.gateway_timeout)
      .build()
      .map_err(|err| Error::GatewayTransient(err.to_string()))?;

    Ok(
      Self::new()
        .register(BalanceGateway::new(store.clone()))
        .register(CodeGateway::new(store.clone()))
        .register(External::new(store.clone(), http.clone(), config, YooKassa))
        .register(External::new(store.clone(), http.clone(), config, CryptoPay))
        .register(External::new(store.clone(), http, config, PsPayments)),
    )
  }

  pub fn register<G: Gateway + 'static>(mut self, gateway: G) -> Self {
    self.inner.insert(gateway.kind(), Arc::new(gateway));
    self
  }

  pub fn get(&self, kind: GatewayKind) -> Result<Arc<dyn Gateway>> {
    self.inner.get(&kind).cloned().ok_or(Error::GatewayUnavailable(kind))
  }
}
