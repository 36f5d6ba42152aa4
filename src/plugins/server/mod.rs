mod admin;
mod handlers;

use std::net::SocketAddr;

use axum::{
  Router, middleware,
  routing::{get, post},
};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{prelude::*, state::AppState};

/// Routes without the per-IP limiter, which needs the peer address.
pub fn router(app: Arc<AppState>) -> Router {
  let api = Router::new()
    .route("/users", post(handlers::register))
    .route("/payments", post(handlers::initiate))
    .route("/payments/{reference}/confirm", post(handlers::confirm))
    .route("/payments/{reference}/reopen", post(handlers::reopen))
    .route("/trial", post(handlers::activate_free))
    .route("/users/{id}/ban", post(handlers::ban))
    .route("/users/{id}/unban", post(handlers::unban))
    .route("/users/{id}", get(admin::user))
    .route("/transfers", post(admin::transfer))
    .route("/stats", get(admin::stats))
    .route("/servers", post(admin::add_server))
    .route("/tariffs", get(admin::tariffs).post(admin::add_tariff))
    .route("/tariffs/{id}/quote", get(admin::quote))
    .route("/promos", post(admin::create_promo))
    .route("/raffles", post(admin::create_raffle))
    .route("/raffles/{id}/tickets/{user_id}", get(admin::tickets))
    .route("/gateways", post(admin::add_gateway))
    .route("/gateways/{id}/activate", post(admin::activate_gateway))
    .route_layer(middleware::from_fn_with_state(
      app.clone(),
      handlers::require_secret,
    ));

  Router::new()
    .route("/health", get(handlers::health))
    .route("/webhooks/{provider}", post(handlers::webhook))
    .nest("/api", api)
    .layer(
      ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
          .allow_origin(Any)
          .allow_methods(Any)
          .allow_headers(Any),
      ),
    )
    .with_state(app)
}

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  fn name(&self) -> &'static str {
    "http"
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = Arc::new(
      GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(100)
        .finish()
        .context("Failed to build rate limiter config")?,
    );
    let limiter = governor_conf.limiter().clone();

    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));
    let router = router(app)
      .layer(GovernorLayer::new(governor_conf))
      .into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP server listening on {addr}");

    let limiter = async {
      loop {
        time::sleep(Duration::from_secs(60)).await;
        limiter.retain_recent();
      }
    };

    let server =
      async { axum::serve(listener, router).await.context("Axum server error") };

    tokio::select! {
      result = server => {
        if let Err(err) = &result {
          error!("Server stopped with error: {err:#}");
        }
        result
      }
      _ = limiter => Ok(()),
    }
  }
}
