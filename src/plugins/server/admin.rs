//! Operator endpoints: catalog upkeep, promo codes, raffles, gateway
//! credentials and user lookups.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{
  entity::{
    GatewayKind, Protocol, TariffKind, gateway_config, payment, promo_code,
    raffle, raffle_ticket, server, subscription, tariff, transaction, user,
  },
  prelude::*,
  state::AppState,
  sv::{self, catalog::NewServer},
};

const HISTORY_LIMIT: u64 = 50;

#[derive(Debug, Serialize)]
pub struct StatsRes {
  pub users: u64,
  pub active_subscriptions: u64,
}

pub async fn stats(State(app): State<Arc<AppState>>) -> Result<Json<StatsRes>> {
  let now = utils::now();
  let stats = app
    .store
    .read(move |db| {
      Box::pin(async move {
        Ok(StatsRes {
          users: sv::User::new(db).count().await?,
          active_subscriptions: sv::Subscription::new(db)
            .count_active(now)
            .await?,
        })
      })
    })
    .await?;
  Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct TariffsQuery {
  #[serde(default)]
  pub kind: TariffKind,
}

pub async fn tariffs(
  State(app): State<Arc<AppState>>,
  Query(query): Query<TariffsQuery>,
) -> Result<Json<Vec<tariff::Model>>> {
  let kind = query.kind;
  let tariffs = app
    .store
    .read(move |db| {
      Box::pin(async move { sv::Catalog::new(db).tariffs(kind).await })
    })
    .await?;
  Ok(Json(tariffs))
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
  pub promo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuoteRes {
  pub tariff_id: i32,
  pub price: i64,
  pub total: i64,
}

/// What the user would pay right now. The promo code is checked, not spent.
pub async fn quote(
  State(app): State<Arc<AppState>>,
  Path(tariff_id): Path<i32>,
  Query(query): Query<QuoteQuery>,
) -> Result<Json<QuoteRes>> {
  let quote = app
    .store
    .read(move |db| {
      let promo = query.promo.clone();
      Box::pin(async move {
        let (tariff, _) =
          sv::Catalog::new(db).resolve_enabled(tariff_id).await?;
        let total =
          sv::Pricing::new(db).price(&tariff, promo.as_deref()).await?;
        Ok(QuoteRes { tariff_id, price: tariff.price, total })
      })
    })
    .await?;
  Ok(Json(quote))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerReq {
  pub name: String,
  pub host: String,
  pub port: i32,
  #[serde(default)]
  pub protocol: Protocol,
  pub panel_url: String,
  pub panel_username: String,
  pub panel_password: String,
  pub inbound_id: i32,
  pub promo_inbound_id: Option<i32>,
}

pub async fn add_server(
  State(app): State<Arc<AppState>>,
  Json(req): Json<ServerReq>,
) -> Result<Json<server::Model>> {
  let server = app
    .store
    .run(move |txn| {
      let req = req.clone();
      Box::pin(async move {
        sv::Catalog::new(txn)
          .add_server(NewServer {
            name: &req.name,
            host: &req.host,
            port: req.port,
            protocol: req.protocol,
            panel_url: &req.panel_url,
            panel_username: &req.panel_username,
            panel_password: &req.panel_password,
            inbound_id: req.inbound_id,
            promo_inbound_id: req.promo_inbound_id,
          })
          .await
      })
    })
    .await?;
  info!(server = %server.name, id = server.id, "Server added");
  Ok(Json(server))
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffReq {
  pub name: String,
  #[serde(default)]
  pub kind: TariffKind,
  #[serde(default)]
  pub price: i64,
  pub days: i32,
  pub server_id: i32,
}

pub async fn add_tariff(
  State(app): State<Arc<AppState>>,
  Json(req): Json<TariffReq>,
) -> Result<Json<tariff::Model>> {
  let tariff = app
    .store
    .run(move |txn| {
      let req = req.clone();
      Box::pin(async move {
        let catalog = sv::Catalog::new(txn);
        catalog.server(req.server_id).await?.ok_or(Error::NotFound("server"))?;
        catalog
          .add_tariff(&req.name, req.kind, req.price, req.days, req.server_id)
          .await
      })
    })
    .await?;
  Ok(Json(tariff))
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromoReq {
  pub code: String,
  pub percentage: i32,
  pub activation_limit: i32,
}

pub async fn create_promo(
  State(app): State<Arc<AppState>>,
  Json(req): Json<PromoReq>,
) -> Result<Json<promo_code::Model>> {
  let promo = app
    .store
    .run(move |txn| {
      let req = req.clone();
      Box::pin(async move {
        sv::Pricing::new(txn)
          .create_promo(&req.code, req.percentage, req.activation_limit)
          .await
      })
    })
    .await
    .map_err(|err| {
      if err.is_unique_violation() {
        Error::validation("promo code already exists")
      } else {
        err
      }
    })?;
  Ok(Json(promo))
}

#[derive(Debug, Deserialize)]
pub struct RaffleReq {
  pub name: String,
}

pub async fn create_raffle(
  State(app): State<Arc<AppState>>,
  Json(req): Json<RaffleReq>,
) -> Result<Json<raffle::Model>> {
  let raffle = app
    .store
    .run(move |txn| {
      let name = req.name.clone();
      Box::pin(async move { sv::Raffle::new(txn).create(&name).await })
    })
    .await?;
  Ok(Json(raffle))
}

pub async fn tickets(
  State(app): State<Arc<AppState>>,
  Path((raffle_id, user_id)): Path<(i32, i64)>,
) -> Result<Json<Vec<raffle_ticket::Model>>> {
  let tickets = app
    .store
    .read(move |db| {
      Box::pin(async move {
        sv::Raffle::new(db).tickets_of(raffle_id, user_id).await
      })
    })
    .await?;
  Ok(Json(tickets))
}

#[derive(Debug, Serialize)]
pub struct UserRes {
  pub user: user::Model,
  pub balance: i64,
  pub history: Vec<transaction::Model>,
  pub payments: Vec<payment::Model>,
  pub subscriptions: Vec<subscription::Model>,
}

pub async fn user(
  State(app): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> Result<Json<UserRes>> {
  let res = app
    .store
    .read(move |db| {
      Box::pin(async move {
        let user =
          sv::User::new(db).by_id(id).await?.ok_or(Error::NotFound("user"))?;
        let ledger = sv::Ledger::new(db);
        Ok(UserRes {
          user,
          balance: ledger.sum(id).await?,
          history: ledger.history(id, HISTORY_LIMIT).await?,
          payments: sv::Payment::new(db).by_user(id).await?,
          subscriptions: sv::Subscription::new(db).by_user(id, true).await?,
        })
      })
    })
    .await?;
  Ok(Json(res))
}

#[derive(Debug, Deserialize)]
pub struct TransferReq {
  pub from: i64,
  pub to: i64,
  pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct TransferRes {
  pub balance: i64,
}

pub async fn transfer(
  State(app): State<Arc<AppState>>,
  Json(req): Json<TransferReq>,
) -> Result<Json<TransferRes>> {
  let balance = app.checkout().transfer(req.from, req.to, req.amount).await?;
  Ok(Json(TransferRes { balance }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayReq {
  pub gateway: GatewayKind,
  pub account: Option<String>,
  pub secret: String,
  pub api_url: Option<String>,
  /// Switch to the new credentials right away
  #[serde(default)]
  pub activate: bool,
}

pub async fn add_gateway(
  State(app): State<Arc<AppState>>,
  Json(req): Json<GatewayReq>,
) -> Result<Json<gateway_config::Model>> {
  let config = app
    .store
    .run(move |txn| {
      let req = req.clone();
      Box::pin(async move {
        let sv = sv::GatewayConfig::new(txn);
        let config =
          sv.add(req.gateway, req.account, req.secret, req.api_url).await?;
        if req.activate { sv.activate(config.id).await } else { Ok(config) }
      })
    })
    .await?;
  Ok(Json(config))
}

pub async fn activate_gateway(
  State(app): State<Arc<AppState>>,
  Path(id): Path<i32>,
) -> Result<Json<gateway_config::Model>> {
  let config = app
    .store
    .run(move |txn| {
      Box::pin(async move { sv::GatewayConfig::new(txn).activate(id).await })
    })
    .await?;
  Ok(Json(config))
}
