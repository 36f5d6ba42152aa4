use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use teloxide::Bot;

use crate::{
  checkout::{Activator, Checkout, Guard},
  config::Config,
  gateway::Gateways,
  notify::{Notifier, TelegramNotifier},
  prelude::*,
  provision::{Provisioner, XuiPanel},
  store::Store,
};

pub struct AppState {
  pub store: Store,
  pub config: Config,
  pub guard: Guard,
  pub gateways: Gateways,
  pub panel: Arc<dyn Provisioner>,
  pub notifier: Arc<dyn Notifier>,
}

impl AppState {
  pub async fn new(config: Config) -> anyhow::Result<Self> {
    info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
      .await
      .context("Failed to connect to database")?;

    info!("Running migrations...");
    Migrator::up(&db, None).await.context("Failed to run migrations")?;

    let store = Store::new(db, config.store_retry);
    let gateways = Gateways::standard(&store, &config)?;
    let panel = XuiPanel::new(config.provision_timeout)?;

    let notifier = TelegramNotifier::new(
      Bot::new(&config.bot_token),
      config.admin_channel,
      config.admins.iter().copied().collect(),
    );

    Ok(Self::from_parts(
      store,
      config,
      gateways,
      Arc::new(panel),
      Arc::new(notifier),
    ))
  }

  /// Wires already built collaborators, used by tests to swap the panel and
  /// chat for fakes.
  pub fn from_parts(
    store: Store,
    config: Config,
    gateways: Gateways,
    panel: Arc<dyn Provisioner>,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    Self { store, config, guard: Guard::new(), gateways, panel, notifier }
  }

  pub fn checkout(&self) -> Checkout<'_> {
    Checkout::new(self)
  }

  pub fn activator(&self) -> Activator<'_> {
    Activator::new(self)
  }
}
