//! VPN shop - payment confirmation and subscription activation
//!
//! Architecture:
//! - SeaORM for database access (SQLite), every call through a retrying store
//! - Payment gateways behind one trait, activations serialized per reference
//! - Axum for the HTTP API and provider webhooks
//! - Teloxide for user and admin notifications

mod checkout;
mod config;
mod entity;
mod error;
mod gateway;
mod notify;
mod plugins;
mod prelude;
mod provision;
mod state;
mod store;
mod sv;
mod utils;

#[cfg(test)]
mod testing;

use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{config::Config, plugins::App, prelude::*, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
      "vpn_shop=debug,tower_http=debug,sea_orm=warn".into()
    }))
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env()?;
  info!("Starting VPN shop v{}", env!("CARGO_PKG_VERSION"));

  let app = Arc::new(AppState::new(config).await?);

  let handles = App::new()
    .register(plugins::server::Plugin)
    .register(plugins::cron::Plugin)
    .run(app);

  tokio::signal::ctrl_c().await.context("Failed to listen for shutdown")?;
  info!("Shutting down");
  for handle in handles {
    handle.abort();
  }
  Ok(())
}
