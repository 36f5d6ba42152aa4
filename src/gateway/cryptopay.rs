use serde::Deserialize;

use super::{Created, Invoice, Provider, ProviderCtx, Status, http};
use crate::{entity::GatewayKind, prelude::*};

const API_URL: &str = "https://pay.crypt.bot/api";

#[derive(Debug, Deserialize)]
struct Response<T> {
  ok: bool,
  result: Option<T>,
  error: Option<json::Value>,
}

impl<T> Response<T> {
  fn into_result(self) -> Result<T> {
    match (self.ok, self.result) {
      (true, Some(result)) => Ok(result),
      (_, _) => Err(Error::GatewayPermanent(
        self.error.map(|e| e.to_string()).unwrap_or_else(|| "empty result".into()),
      )),
    }
  }
}

#[derive(Debug, Deserialize)]
struct CryptoInvoice {
  invoice_id: i64,
  status: String,
  bot_invoice_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Invoices {
  items: Vec<CryptoInvoice>,
}

/// Crypto Pay API token goes into `secret`.
pub struct CryptoPay;

fn status(raw: &str) -> Status {
  match raw {
    "paid" => Status::Paid,
    "expired" => Status::Failed,
    // active
    _ => Status::Pending,
  }
}

#[async_trait]
impl Provider for CryptoPay {
  fn kind(&self) -> GatewayKind {
    GatewayKind::CryptoPay
  }

  async fn create(
    &self,
    ctx: &ProviderCtx<'_>,
    invoice: &Invoice,
  ) -> Result<Created> {
    let body = json::json!({
      "currency_type": "fiat",
      "fiat": ctx.currency,
      "amount": utils::format_money(invoice.amount),
      "description": invoice.description,
      "payload": invoice.meta.user_id.to_string(),
      "paid_btn_name": "callback",
      "paid_btn_url": ctx.return_url,
    });

    let request = ctx
      .http
      .post(format!("{}/createInvoice", ctx.api_url(API_URL)))
      .header("Crypto-Pay-API-Token", &ctx.config.secret)
      .json(&body);
    let response: Response<CryptoInvoice> = http::send_json(request).await?;
    let created = response.into_result()?;

    Ok(Created {
      id: created.invoice_id.to_string(),
      redirect: created.bot_invoice_url,
    })
  }

  async fn status(&self, ctx: &ProviderCtx<'_>, id: &str) -> Result<Status> {
    let request = ctx
      .http
      .get(format!("{}/getInvoices", ctx.api_url(API_URL)))
      .header("Crypto-Pay-API-Token", &ctx.config.secret)
      .query(&[("invoice_ids", id)]);
    let response: Response<Invoices> = http::send_json(request).await?;

    let invoice = response
      .into_result()?
      .items
      .into_iter()
      .next()
      .ok_or_else(|| Error::GatewayPermanent(format!("invoice {id} not found")))?;

    debug!(id, status = invoice.status, "Crypto Pay invoice status");
    Ok(status(&invoice.status))
  }

  fn webhook_id(&self, body: &json::Value) -> Option<String> {
    let id = &body["payload"]["invoice_id"];
    id.as_i64().map(|id| id.to_string()).or_else(|| id.as_str().map(str::to_string))
  }
}
