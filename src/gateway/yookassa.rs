use serde::Deserialize;
use uuid::Uuid;

use super::{Created, Invoice, Provider, ProviderCtx, Status, http};
use crate::{entity::GatewayKind, prelude::*};

const API_URL: &str = "https://api.yookassa.ru/v3";

#[derive(Debug, Deserialize)]
struct Payment {
  id: String,
  status: String,
  confirmation: Option<Confirmation>,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
  confirmation_url: Option<String>,
}

/// Shop id goes into `account`, the secret key into `secret`.
pub struct YooKassa;

fn status(raw: &str) -> Status {
  match raw {
    "succeeded" => Status::Paid,
    "canceled" => Status::Failed,
    // pending, waiting_for_capture
    _ => Status::Pending,
  }
}

#[async_trait]
impl Provider for YooKassa {
  fn kind(&self) -> GatewayKind {
    GatewayKind::YooKassa
  }

  async fn create(
    &self,
    ctx: &ProviderCtx<'_>,
    invoice: &Invoice,
  ) -> Result<Created> {
    let body = json::json!({
      "amount": {
        "value": utils::format_money(invoice.amount),
        "currency": ctx.currency,
      },
      "capture": true,
      "confirmation": { "type": "redirect", "return_url": ctx.return_url },
      "description": invoice.description,
      "metadata": {
        "user_id": invoice.meta.user_id,
        "tariff_id": invoice.meta.tariff_id,
        "topup": invoice.meta.topup,
      },
    });

    let request = ctx
      .http
      .post(format!("{}/payments", ctx.api_url(API_URL)))
      .basic_auth(ctx.account()?, Some(&ctx.config.secret))
      .header("Idempotence-Key", Uuid::new_v4().to_string())
      .json(&body);
    let payment: Payment = http::send_json(request).await?;

    Ok(Created {
      id: payment.id,
      redirect: payment.confirmation.and_then(|c| c.confirmation_url),
    })
  }

  async fn status(&self, ctx: &ProviderCtx<'_>, id: &str) -> Result<Status> {
    let request = ctx
      .http
      .get(format!("{}/payments/{id}", ctx.api_url(API_URL)))
      .basic_auth(ctx.account()?, Some(&ctx.config.secret));
    let payment: Payment = http::send_json(request).await?;

    debug!(id, status = payment.status, "YooKassa payment status");
    Ok(status(&payment.status))
  }

  fn webhook_id(&self, body: &json::Value) -> Option<String> {
    body["object"]["id"].as_str().map(str::to_string)
  }
}
