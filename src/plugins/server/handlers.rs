use axum::{
  Json,
  extract::{Path, Request, State},
  http::StatusCode,
  middleware::Next,
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
  checkout::{Confirmation, PaymentRequest, Purchase},
  entity::{GatewayKind, subscription, user},
  gateway::{Gateway, Initiated},
  prelude::*,
  state::AppState,
};

const SECRET_HEADER: &str = "x-api-secret";

pub async fn require_secret(
  State(app): State<Arc<AppState>>,
  request: Request,
  next: Next,
) -> Response {
  let expected = app.config.secret.as_str();
  let presented = request
    .headers()
    .get(SECRET_HEADER)
    .and_then(|value| value.to_str().ok());

  // an unset secret locks the API instead of opening it
  if expected.is_empty() || presented != Some(expected) {
    let body =
      json::json!({ "success": false, "error": "Invalid API secret" });
    return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
  }
  next.run(request).await
}

pub async fn health() -> &'static str {
  "OK"
}

#[derive(Debug, Deserialize)]
pub struct RegisterReq {
  pub user_id: i64,
  pub username: Option<String>,
  /// Code of the user who invited this one
  pub referral_code: Option<String>,
}

pub async fn register(
  State(app): State<Arc<AppState>>,
  Json(req): Json<RegisterReq>,
) -> Result<Json<user::Model>> {
  let checkout = app.checkout();
  let user =
    checkout.register(req.user_id, req.username, req.referral_code).await?;
  Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct InitiateReq {
  pub user_id: i64,
  pub gateway: GatewayKind,
  pub tariff_id: Option<i32>,
  /// Minor units; set instead of `tariff_id` for a balance top-up
  pub topup: Option<i64>,
  pub promo_code: Option<String>,
  pub payment_code: Option<String>,
}

pub async fn initiate(
  State(app): State<Arc<AppState>>,
  Json(req): Json<InitiateReq>,
) -> Result<Json<Initiated>> {
  let purchase = match (req.tariff_id, req.topup) {
    (Some(tariff), None) => Purchase::Tariff(tariff),
    (None, Some(amount)) => Purchase::TopUp(amount),
    _ => {
      return Err(Error::validation("set exactly one of tariff_id and topup"));
    }
  };

  let initiated = app
    .checkout()
    .initiate_payment(PaymentRequest {
      user_id: req.user_id,
      purchase,
      gateway: req.gateway,
      promo_code: req.promo_code,
      payment_code: req.payment_code,
    })
    .await?;
  Ok(Json(initiated))
}

pub async fn confirm(
  State(app): State<Arc<AppState>>,
  Path(reference): Path<String>,
) -> Result<Json<Confirmation>> {
  Ok(Json(app.checkout().confirm_payment(&reference).await?))
}

pub async fn reopen(
  State(app): State<Arc<AppState>>,
  Path(reference): Path<String>,
) -> Result<StatusCode> {
  app.checkout().reopen(&reference).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct FreeReq {
  pub user_id: i64,
  pub tariff_id: i32,
}

pub async fn activate_free(
  State(app): State<Arc<AppState>>,
  Json(req): Json<FreeReq>,
) -> Result<Json<subscription::Model>> {
  let checkout = app.checkout();
  Ok(Json(checkout.activate_free(req.user_id, req.tariff_id).await?))
}

#[derive(Debug, Serialize)]
pub struct BanRes {
  pub revoked: usize,
}

pub async fn ban(
  State(app): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> Result<Json<BanRes>> {
  let revoked = app.checkout().ban(id).await?;
  Ok(Json(BanRes { revoked }))
}

pub async fn unban(
  State(app): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> Result<StatusCode> {
  app.checkout().unban(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// Provider notification. The body only names the payment; its state is
/// always re-read from the provider.
pub async fn webhook(
  State(app): State<Arc<AppState>>,
  Path(provider): Path<String>,
  Json(body): Json<json::Value>,
) -> Result<Json<Confirmation>> {
  let kind = GatewayKind::from_prefix(&provider)
    .filter(|kind| kind.is_external())
    .ok_or(Error::NotFound("provider"))?;

  let gateway = app.gateways.get(kind)?;
  let reference = gateway
    .webhook_reference(&body)
    .ok_or_else(|| Error::validation("webhook carries no payment id"))?;

  debug!(reference, "Webhook received");
  Ok(Json(app.checkout().confirm_payment(&reference).await?))
}

#[cfg(test)]
mod tests {
  use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request},
  };
  use tower::ServiceExt;

  use super::*;
  use crate::{
    config::Config,
    gateway::Status,
    plugins::server::router,
    testing::{self, Fixture},
  };

  async fn fixture() -> (Fixture, Router) {
    let config = Config { secret: "s3cret".into(), ..testing::config() };
    let fx = testing::app_with(config).await;
    let router = router(fx.app.clone());
    (fx, router)
  }

  fn post(
    uri: &str,
    secret: Option<&str>,
    body: json::Value,
  ) -> Request<Body> {
    let mut request = Request::builder()
      .method(Method::POST)
      .uri(uri)
      .header("content-type", "application/json");
    if let Some(secret) = secret {
      request = request.header(SECRET_HEADER, secret);
    }
    request.body(Body::from(body.to_string())).unwrap()
  }

  async fn body(response: Response) -> json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn api_requires_secret() {
    let (_fx, router) = fixture().await;
    let payload =
      json::json!({ "user_id": 1, "gateway": "balance", "tariff_id": 1 });

    let response = router
      .clone()
      .oneshot(post("/api/payments", Some("wrong"), payload.clone()))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response =
      router.oneshot(post("/api/payments", None, payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn insufficient_funds_is_reported() {
    let (fx, router) = fixture().await;
    testing::seed_user(&fx.db, 1).await;
    testing::deposit(&fx.db, 1, 30_000).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;

    let payload = json::json!({
      "user_id": 1,
      "gateway": "balance",
      "tariff_id": tariff.id,
    });
    let response = router
      .oneshot(post("/api/payments", Some("s3cret"), payload))
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body(response).await;
    assert_eq!(body["success"], false);
  }

  #[tokio::test]
  async fn webhook_confirms_through_provider() {
    let (fx, router) = fixture().await;
    testing::seed_user(&fx.db, 1).await;
    let (tariff, _) = testing::seed_tariff(&fx.db, 50_000, 30).await;

    let payload = json::json!({
      "user_id": 1,
      "gateway": "yookassa",
      "tariff_id": tariff.id,
    });
    let response = router
      .clone()
      .oneshot(post("/api/payments", Some("s3cret"), payload))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let initiated = body(response).await;
    let reference = initiated["reference"].as_str().unwrap().to_string();
    let id = reference.trim_start_matches("yookassa:");

    // the notification claims success, the provider still says pending
    let hook =
      json::json!({ "event": "payment.succeeded", "object": { "id": id } });
    let response = router
      .clone()
      .oneshot(post("/webhooks/yookassa", None, hook.clone()))
      .await
      .unwrap();
    assert_eq!(body(response).await["status"], "pending");

    fx.provider.set_status(Status::Paid);
    let response =
      router.oneshot(post("/webhooks/yookassa", None, hook)).await.unwrap();
    let outcome = body(response).await;
    assert_eq!(outcome["status"], "activated");
    let stored = &outcome["subscription"]["payment_reference"];
    assert_eq!(stored, reference.as_str());
  }

  #[tokio::test]
  async fn registration_links_referrer() {
    let (_fx, router) = fixture().await;

    let payload = json::json!({ "user_id": 1 });
    let response = router
      .clone()
      .oneshot(post("/api/users", Some("s3cret"), payload))
      .await
      .unwrap();
    let referrer = body(response).await;
    let code = referrer["referral_code"].clone();

    let invited = json::json!({ "user_id": 2, "referral_code": code });
    let response = router
      .oneshot(post("/api/users", Some("s3cret"), invited))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await["referred_by"], 1);
  }

  #[tokio::test]
  async fn unknown_provider_is_not_found() {
    let (_fx, router) = fixture().await;
    let response = router
      .oneshot(post("/webhooks/balance", None, json::json!({})))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }
}
