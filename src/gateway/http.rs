use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::prelude::*;

/// Network trouble and provider outages can be polled again later; any
/// other rejection is final.
pub fn classify(err: reqwest::Error) -> Error {
  if err.is_timeout() || err.is_connect() || err.is_request() {
    return Error::GatewayTransient(err.to_string());
  }
  match err.status() {
    Some(status) if !is_transient(status) => {
      Error::GatewayPermanent(err.to_string())
    }
    _ => Error::GatewayTransient(err.to_string()),
  }
}

fn is_transient(status: StatusCode) -> bool {
  status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

pub async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
  let response = request.send().await.map_err(classify)?;
  let status = response.status();

  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    let msg = format!("{status}: {}", body.chars().take(200).collect::<String>());
    return Err(if is_transient(status) {
      Error::GatewayTransient(msg)
    } else {
      Error::GatewayPermanent(msg)
    });
  }

  // An unreadable success body says nothing about the payment itself.
  response
    .json()
    .await
    .map_err(|err| Error::GatewayTransient(format!("unexpected response: {err}")))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn outages_are_transient() {
    assert!(is_transient(StatusCode::BAD_GATEWAY));
    assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
    assert!(!is_transient(StatusCode::NOT_FOUND));
    assert!(!is_transient(StatusCode::UNAUTHORIZED));
  }
}
