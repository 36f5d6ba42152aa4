//! VPN panel access.
//!
//! Provisioning is not idempotent: every `create_credential` call makes a new
//! client on the panel. Callers guarantee one call per activation.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  entity::{Protocol, TariffKind, server, tariff},
  prelude::*,
};

/// Which inbound of the server a credential lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
  Primary,
  Promo,
}

impl Variant {
  pub fn for_tariff(tariff: &tariff::Model) -> Self {
    match tariff.kind {
      TariffKind::Promo => Self::Promo,
      TariffKind::Regular | TariffKind::Trial => Self::Primary,
    }
  }

  fn inbound(self, server: &server::Model) -> i32 {
    match self {
      Self::Primary => server.inbound_id,
      Self::Promo => server.promo_inbound_id.unwrap_or(server.inbound_id),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Owner {
  pub tg_user_id: i64,
  pub expires_at: DateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
  /// Panel-side id, needed to revoke
  pub client_id: String,
  /// Connection link handed to the user
  pub link: String,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
  async fn create_credential(
    &self,
    server: &server::Model,
    variant: Variant,
    owner: &Owner,
  ) -> Result<Credential>;

  async fn revoke_credential(
    &self,
    server: &server::Model,
    variant: Variant,
    client_id: &str,
  ) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct PanelResponse {
  success: bool,
  #[serde(default)]
  msg: String,
}

const SS_METHOD: &str = "chacha20-ietf-poly1305";

/// 3x-ui panel over its HTTP API, one session cookie per panel host.
pub struct XuiPanel {
  http: reqwest::Client,
}

impl XuiPanel {
  pub fn new(timeout: Duration) -> Result<Self> {
    let http = reqwest::Client::builder()
      .cookie_store(true)
      .timeout(timeout)
      .build()
      .map_err(failed)?;
    Ok(Self { http })
  }

  async fn login(&self, server: &server::Model) -> Result<()> {
    let form = [
      ("username", server.panel_username.as_str()),
      ("password", server.panel_password.as_str()),
    ];
    let response = self
      .http
      .post(format!("{}/login", server.panel_url))
      .form(&form)
      .send()
      .await
      .map_err(failed)?;
    check(response).await
  }

  async fn call(
    &self,
    server: &server::Model,
    path: &str,
    body: Option<json::Value>,
  ) -> Result<()> {
    self.login(server).await?;

    let mut request =
      self.http.post(format!("{}/panel/api/inbounds/{path}", server.panel_url));
    if let Some(body) = body {
      request = request.json(&body);
    }
    check(request.send().await.map_err(failed)?).await
  }
}

fn failed(err: reqwest::Error) -> Error {
  if err.is_timeout() {
    Error::Provisioning("panel timed out".into())
  } else {
    Error::Provisioning(err.to_string())
  }
}

async fn check(response: reqwest::Response) -> Result<()> {
  let status = response.status();
  if !status.is_success() {
    return Err(Error::Provisioning(format!("panel answered {status}")));
  }
  let body: PanelResponse = response.json().await.map_err(failed)?;
  if !body.success {
    return Err(Error::Provisioning(body.msg));
  }
  Ok(())
}

#[async_trait]
impl Provisioner for XuiPanel {
  async fn create_credential(
    &self,
    server: &server::Model,
    variant: Variant,
    owner: &Owner,
  ) -> Result<Credential> {
    let uuid = Uuid::new_v4();
    let email = format!("{}-{}", owner.tg_user_id, &uuid.simple().to_string()[..8]);
    let expiry = owner.expires_at.and_utc().timestamp_millis();

    let (client, client_id) = match server.protocol {
      Protocol::Vless => (
        json::json!({
          "id": uuid.to_string(),
          "flow": "",
          "email": email,
          "limitIp": 0,
          "totalGB": 0,
          "expiryTime": expiry,
          "enable": true,
          "tgId": owner.tg_user_id.to_string(),
          "subId": uuid.simple().to_string(),
        }),
        uuid.to_string(),
      ),
      Protocol::Shadowsocks => (
        json::json!({
          "method": SS_METHOD,
          "password": uuid.simple().to_string(),
          "email": email,
          "limitIp": 0,
          "totalGB": 0,
          "expiryTime": expiry,
          "enable": true,
          "tgId": owner.tg_user_id.to_string(),
          "subId": uuid.simple().to_string(),
        }),
        email.clone(),
      ),
    };

    let settings = json::json!({ "clients": [client] }).to_string();
    let body = json::json!({ "id": variant.inbound(server), "settings": settings });
    self.call(server, "addClient", Some(body)).await?;

    info!(server = server.name, user = owner.tg_user_id, ?variant, "Client added");
    Ok(Credential { link: link(server, &uuid, &email), client_id })
  }

  async fn revoke_credential(
    &self,
    server: &server::Model,
    variant: Variant,
    client_id: &str,
  ) -> Result<()> {
    let inbound = variant.inbound(server);
    self.call(server, &format!("{inbound}/delClient/{client_id}"), None).await?;
    info!(server = server.name, client_id, "Client removed");
    Ok(())
  }
}

/// Connection link for a freshly created client.
pub fn link(server: &server::Model, uuid: &Uuid, remark: &str) -> String {
  let remark = urlencoding::encode(remark);
  match server.protocol {
    Protocol::Vless => {
      let params = server
        .link_params
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or("type=tcp&security=none");
      format!(
        "vless://{uuid}@{}:{}?encryption=none&{params}#{remark}",
        server.host, server.port
      )
    }
    Protocol::Shadowsocks => {
      let user_info =
        URL_SAFE_NO_PAD.encode(format!("{SS_METHOD}:{}", uuid.simple()));
      format!("ss://{user_info}@{}:{}#{remark}", server.host, server.port)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn server(protocol: Protocol) -> server::Model {
    server::Model {
      id: 1,
      name: "nl-1".into(),
      host: "nl.example.net".into(),
      port: 443,
      protocol,
      panel_url: "https://panel.example.net".into(),
      panel_username: "admin".into(),
      panel_password: "secret".into(),
      inbound_id: 1,
      promo_inbound_id: Some(2),
      link_params: Some("type=tcp&security=reality&sni=example.com".into()),
      is_enabled: true,
    }
  }

  #[test]
  fn vless_link_carries_params() {
    let uuid = Uuid::nil();
    let link = link(&server(Protocol::Vless), &uuid, "42 nl");
    assert_eq!(
      link,
      "vless://00000000-0000-0000-0000-000000000000@nl.example.net:443\
       ?encryption=none&type=tcp&security=reality&sni=example.com#42%20nl"
    );
  }

  #[test]
  fn shadowsocks_link_is_base64() {
    let link = link(&server(Protocol::Shadowsocks), &Uuid::nil(), "x");
    let encoded = URL_SAFE_NO_PAD.encode(format!(
      "{SS_METHOD}:00000000000000000000000000000000"
    ));
    assert_eq!(link, format!("ss://{encoded}@nl.example.net:443#x"));
  }

  #[test]
  fn promo_variant_uses_secondary_inbound() {
    let mut server = server(Protocol::Vless);
    assert_eq!(Variant::Promo.inbound(&server), 2);
    assert_eq!(Variant::Primary.inbound(&server), 1);

    server.promo_inbound_id = None;
    assert_eq!(Variant::Promo.inbound(&server), 1);
  }
}
