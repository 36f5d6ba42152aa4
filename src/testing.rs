//! Fixtures and fakes shared by the unit tests.

use std::sync::{
  Mutex,
  atomic::{AtomicU32, Ordering},
};

use migration::{Migrator, MigratorTrait};
use sea_orm::Database;

use crate::{
  config::Config,
  entity::{
    GatewayKind, TariffKind, TransactionType, payment_code, server,
    subscription, tariff, user,
  },
  gateway::{
    BalanceGateway, CodeGateway, Created, External, Gateways, Invoice,
    Provider, ProviderCtx, Status,
  },
  notify::Notifier,
  prelude::*,
  provision::{Credential, Owner, Provisioner, Variant},
  state::AppState,
  store::{RetryPolicy, Store},
  sv::{self, catalog::NewServer, subscription::NewSubscription},
};

pub async fn db() -> DatabaseConnection {
  let db = Database::connect("sqlite::memory:").await.unwrap();
  Migrator::up(&db, None).await.unwrap();
  db
}

pub fn fast_retry() -> RetryPolicy {
  RetryPolicy { attempts: 5, base: Duration::from_millis(1) }
}

pub fn store(db: &DatabaseConnection) -> Store {
  Store::new(db.clone(), fast_retry())
}

pub async fn seed_user(db: &DatabaseConnection, tg_user_id: i64) -> user::Model {
  sv::User::new(db).get_or_create(tg_user_id, None).await.unwrap()
}

pub async fn deposit(db: &DatabaseConnection, tg_user_id: i64, amount: i64) {
  sv::Ledger::new(db)
    .post(tg_user_id, amount, TransactionType::Deposit, "Seed", None)
    .await
    .unwrap();
}

pub async fn seed_server(db: &DatabaseConnection) -> server::Model {
  sv::Catalog::new(db)
    .add_server(NewServer {
      name: "nl-1",
      host: "nl.example.net",
      port: 443,
      protocol: Default::default(),
      panel_url: "https://panel.example.net",
      panel_username: "admin",
      panel_password: "secret",
      inbound_id: 1,
      promo_inbound_id: Some(2),
    })
    .await
    .unwrap()
}

pub async fn seed_tariff_of(
  db: &DatabaseConnection,
  kind: TariffKind,
  price: i64,
  days: i32,
) -> (tariff::Model, server::Model) {
  let server = seed_server(db).await;
  let tariff = sv::Catalog::new(db)
    .add_tariff("Month", kind, price, days, server.id)
    .await
    .unwrap();
  (tariff, server)
}

pub async fn seed_tariff(
  db: &DatabaseConnection,
  price: i64,
  days: i32,
) -> (tariff::Model, server::Model) {
  seed_tariff_of(db, TariffKind::Regular, price, days).await
}

pub async fn seed_subscription(
  db: &DatabaseConnection,
  tg_user_id: i64,
  tariff: &tariff::Model,
  reference: Option<&str>,
) -> subscription::Model {
  sv::Subscription::new(db)
    .create(NewSubscription {
      user_id: tg_user_id,
      tariff_id: tariff.id,
      server_id: tariff.server_id,
      days: tariff.days,
      credential: "vless://seed".into(),
      client_id: format!("seed-{tg_user_id}-{}", tariff.id),
      payment_reference: reference.map(String::from),
    })
    .await
    .unwrap()
}

pub async fn seed_payment_code(
  db: &DatabaseConnection,
  code: &str,
  amount: i64,
) -> payment_code::Model {
  payment_code::ActiveModel {
    code: Set(code.to_string()),
    amount: Set(amount),
    is_enabled: Set(true),
    created_at: Set(utils::now()),
  }
  .insert(db)
  .await
  .unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelMode {
  Healthy,
  Failing,
  /// Never answers; trips the provisioning timeout
  Hanging,
  /// Answers like `Healthy`, well inside the provisioning timeout
  Slow,
}

/// In-memory VPN panel.
pub struct FakePanel {
  mode: Mutex<PanelMode>,
  created: AtomicU32,
  revoked: Mutex<Vec<String>>,
}

impl FakePanel {
  pub fn new() -> Self {
    Self {
      mode: Mutex::new(PanelMode::Healthy),
      created: AtomicU32::new(0),
      revoked: Mutex::new(Vec::new()),
    }
  }

  pub fn set_mode(&self, mode: PanelMode) {
    *self.mode.lock().unwrap() = mode;
  }

  /// Calls to `create_credential`, successful or not.
  pub fn calls(&self) -> u32 {
    self.created.load(Ordering::SeqCst)
  }

  pub fn revoked(&self) -> Vec<String> {
    self.revoked.lock().unwrap().clone()
  }
}

#[async_trait]
impl Provisioner for FakePanel {
  async fn create_credential(
    &self,
    server: &server::Model,
    variant: Variant,
    owner: &Owner,
  ) -> Result<Credential> {
    let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
    let mode = *self.mode.lock().unwrap();
    match mode {
      PanelMode::Healthy => {
        let client_id = format!("client-{n}");
        let link = format!(
          "vless://{client_id}@{}:{}#{}-{variant:?}",
          server.host, server.port, owner.tg_user_id
        );
        Ok(Credential { client_id, link })
      }
      PanelMode::Slow => {
        time::sleep(Duration::from_millis(20)).await;
        Ok(Credential {
          link: format!("vless://client-{n}@{}:{}", server.host, server.port),
          client_id: format!("client-{n}"),
        })
      }
      PanelMode::Failing => Err(Error::Provisioning("panel answered 500".into())),
      PanelMode::Hanging => {
        time::sleep(Duration::from_secs(30)).await;
        Err(Error::Provisioning("unreachable".into()))
      }
    }
  }

  async fn revoke_credential(
    &self,
    _server: &server::Model,
    _variant: Variant,
    client_id: &str,
  ) -> Result<()> {
    self.revoked.lock().unwrap().push(client_id.to_string());
    Ok(())
  }
}

/// Records messages instead of sending them.
#[derive(Default)]
pub struct FakeNotifier {
  users: Mutex<Vec<(i64, String)>>,
  admin: Mutex<Vec<String>>,
}

impl FakeNotifier {
  pub fn to_user(&self, tg_user_id: i64) -> Vec<String> {
    let users = self.users.lock().unwrap();
    users
      .iter()
      .filter(|(id, _)| *id == tg_user_id)
      .map(|(_, text)| text.clone())
      .collect()
  }

  pub fn to_admin(&self) -> Vec<String> {
    self.admin.lock().unwrap().clone()
  }
}

#[async_trait]
impl Notifier for FakeNotifier {
  async fn notify_user(&self, tg_user_id: i64, text: &str) {
    self.users.lock().unwrap().push((tg_user_id, text.to_string()));
  }

  async fn notify_admin_channel(&self, text: &str) {
    self.admin.lock().unwrap().push(text.to_string());
  }
}

/// Scripted external provider posing as YooKassa.
#[derive(Clone)]
pub struct FakeProvider {
  status: Arc<Mutex<Status>>,
  rejection: Arc<Mutex<Option<String>>>,
  invoices: Arc<AtomicU32>,
}

impl FakeProvider {
  pub fn new() -> Self {
    Self {
      status: Arc::new(Mutex::new(Status::Pending)),
      rejection: Arc::new(Mutex::new(None)),
      invoices: Arc::new(AtomicU32::new(0)),
    }
  }

  pub fn set_status(&self, status: Status) {
    *self.status.lock().unwrap() = status;
  }

  /// Rejects the next status lookup the way a provider refuses bad
  /// credentials.
  pub fn reject_next_lookup(&self, reason: &str) {
    *self.rejection.lock().unwrap() = Some(reason.to_string());
  }
}

#[async_trait]
impl Provider for FakeProvider {
  fn kind(&self) -> GatewayKind {
    GatewayKind::YooKassa
  }

  async fn create(
    &self,
    _ctx: &ProviderCtx<'_>,
    _invoice: &Invoice,
  ) -> Result<Created> {
    let n = self.invoices.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Created {
      id: format!("inv-{n}"),
      redirect: Some(format!("https://pay.example.net/inv-{n}")),
    })
  }

  async fn status(&self, _ctx: &ProviderCtx<'_>, _id: &str) -> Result<Status> {
    if let Some(reason) = self.rejection.lock().unwrap().take() {
      return Err(Error::GatewayPermanent(reason));
    }
    Ok(*self.status.lock().unwrap())
  }

  fn webhook_id(&self, body: &json::Value) -> Option<String> {
    body["object"]["id"].as_str().map(String::from)
  }
}

pub struct Fixture {
  pub db: DatabaseConnection,
  pub app: Arc<AppState>,
  pub panel: Arc<FakePanel>,
  pub notifier: Arc<FakeNotifier>,
  pub provider: FakeProvider,
}

pub fn config() -> Config {
  Config {
    store_retry: fast_retry(),
    gateway_timeout: Duration::from_secs(2),
    provision_timeout: Duration::from_millis(100),
    ..Config::default()
  }
}

/// Full application over an in-memory database with every external
/// collaborator faked. YooKassa is backed by [`FakeProvider`].
pub async fn app() -> Fixture {
  app_with(config()).await
}

pub async fn app_with(config: Config) -> Fixture {
  let db = db().await;
  let store = store(&db);

  let gateways = sv::GatewayConfig::new(&db);
  let yookassa = gateways
    .add(GatewayKind::YooKassa, Some("shop".into()), "key".into(), None)
    .await
    .unwrap();
  gateways.activate(yookassa.id).await.unwrap();

  let provider = FakeProvider::new();
  let gateways = Gateways::new()
    .register(BalanceGateway::new(store.clone()))
    .register(CodeGateway::new(store.clone()))
    .register(External::new(
      store.clone(),
      reqwest::Client::new(),
      &config,
      provider.clone(),
    ));

  let panel = Arc::new(FakePanel::new());
  let notifier = Arc::new(FakeNotifier::default());
  let app = AppState::from_parts(
    store,
    config,
    gateways,
    panel.clone(),
    notifier.clone(),
  );

  Fixture { db, app: Arc::new(app), panel, notifier, provider }
}
