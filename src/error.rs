//! Error types for the checkout engine

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};

use crate::entity::GatewayKind;

/// SQLite reports write contention through these messages.
const BUSY_MARKERS: &[&str] =
  &["database is locked", "database table is locked", "SQLITE_BUSY"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Promo {
  #[error("code not found")]
  NotFound,
  #[error("code is disabled")]
  Disabled,
  #[error("activation limit reached")]
  Exhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("Database error: {0}")]
  Database(#[from] DbErr),

  #[error("Storage unavailable after {attempts} attempts")]
  StorageUnavailable { attempts: u32 },

  #[error("Validation failed: {0}")]
  Validation(String),

  #[error("Promo code rejected: {0}")]
  Promo(#[from] Promo),

  #[error("Insufficient funds: required {required}, available {available}")]
  InsufficientFunds { required: i64, available: i64 },

  #[error("Gateway `{0}` is not configured")]
  GatewayUnavailable(GatewayKind),

  #[error("Gateway temporarily unavailable: {0}")]
  GatewayTransient(String),

  #[error("Gateway rejected the payment: {0}")]
  GatewayPermanent(String),

  #[error("Provisioning failed: {0}")]
  Provisioning(String),

  #[error("{0} not found")]
  NotFound(&'static str),

  #[error("User is banned")]
  UserDisabled,

  #[error("JSON error: {0}")]
  Json(#[from] json::Error),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }

  /// Contention that goes away on its own; retried by the store.
  pub fn is_transient_storage(&self) -> bool {
    match self {
      Self::Database(err) => {
        let msg = err.to_string();
        BUSY_MARKERS.iter().any(|marker| msg.contains(marker))
      }
      _ => false,
    }
  }

  pub fn is_unique_violation(&self) -> bool {
    matches!(
      self,
      Self::Database(err)
        if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    )
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = match &self {
      Error::Validation(_) | Error::Promo(_) => StatusCode::BAD_REQUEST,
      Error::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::UserDisabled => StatusCode::FORBIDDEN,
      Error::GatewayUnavailable(_) | Error::GatewayTransient(_) => {
        StatusCode::SERVICE_UNAVAILABLE
      }
      Error::GatewayPermanent(_) => StatusCode::UNPROCESSABLE_ENTITY,
      Error::Provisioning(_) => StatusCode::ACCEPTED,
      Error::Database(_) | Error::StorageUnavailable { .. } | Error::Json(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };

    let message = if status.is_server_error()
      && !matches!(self, Error::GatewayUnavailable(_) | Error::GatewayTransient(_))
    {
      "Internal error, try again later".to_string()
    } else {
      self.to_string()
    };

    let body = json::json!({
      "success": false,
      "error": message,
    });

    (status, Json(body)).into_response()
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn busy_database_is_transient() {
    let err = Error::Database(DbErr::Custom("database is locked".into()));
    assert!(err.is_transient_storage());

    let err = Error::Database(DbErr::Custom("no such table: users".into()));
    assert!(!err.is_transient_storage());

    assert!(!Error::NotFound("payment").is_transient_storage());
  }
}
