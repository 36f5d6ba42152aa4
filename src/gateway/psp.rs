use serde::Deserialize;

use super::{Created, Invoice, Provider, ProviderCtx, Status, http};
use crate::{entity::GatewayKind, prelude::*};

#[derive(Debug, Deserialize)]
struct PspInvoice {
  id: String,
  #[serde(default)]
  status: String,
  payment_url: Option<String>,
}

/// Host-to-host card acquiring. The endpoint has no public default, so
/// `api_url` must be set; `account` is the merchant id, `secret` the token.
pub struct PsPayments;

fn status(raw: &str) -> Status {
  match raw.to_ascii_lowercase().as_str() {
    "paid" | "success" | "completed" => Status::Paid,
    "failed" | "expired" | "canceled" | "cancelled" | "rejected" => {
      Status::Failed
    }
    _ => Status::Pending,
  }
}

fn endpoint<'a>(ctx: &'a ProviderCtx<'_>) -> Result<&'a str> {
  ctx
    .config
    .api_url
    .as_deref()
    .map(|url| url.trim_end_matches('/'))
    .ok_or(Error::GatewayUnavailable(GatewayKind::PsPayments))
}

#[async_trait]
impl Provider for PsPayments {
  fn kind(&self) -> GatewayKind {
    GatewayKind::PsPayments
  }

  async fn create(
    &self,
    ctx: &ProviderCtx<'_>,
    invoice: &Invoice,
  ) -> Result<Created> {
    let body = json::json!({
      "merchant_id": ctx.account()?,
      "amount": invoice.amount,
      "currency": ctx.currency,
      "description": invoice.description,
      "return_url": ctx.return_url,
      "metadata": { "user_id": invoice.meta.user_id },
    });

    let request = ctx
      .http
      .post(format!("{}/invoices", endpoint(ctx)?))
      .bearer_auth(&ctx.config.secret)
      .json(&body);
    let created: PspInvoice = http::send_json(request).await?;

    Ok(Created { id: created.id, redirect: created.payment_url })
  }

  async fn status(&self, ctx: &ProviderCtx<'_>, id: &str) -> Result<Status> {
    let request = ctx
      .http
      .get(format!("{}/invoices/{id}", endpoint(ctx)?))
      .bearer_auth(&ctx.config.secret);
    let invoice: PspInvoice = http::send_json(request).await?;

    debug!(id = invoice.id, status = invoice.status, "PSP invoice status");
    Ok(status(&invoice.status))
  }

  fn webhook_id(&self, body: &json::Value) -> Option<String> {
    body["invoice_id"]
      .as_str()
      .or_else(|| body["id"].as_str())
      .map(str::to_string)
  }
}
