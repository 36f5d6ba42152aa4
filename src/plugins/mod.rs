//! Long-running services sharing one [`AppState`]. A service that returns or
//! panics is restarted after a pause.

pub mod cron;
pub mod server;

use tokio::task::JoinHandle;

use crate::{prelude::*, state::AppState};

const RESTART_DELAY: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str {
    std::any::type_name::<Self>()
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct App {
  plugins: Vec<Arc<dyn Plugin>>,
}

impl App {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<P: Plugin + 'static>(mut self, plugin: P) -> Self {
    self.plugins.push(Arc::new(plugin));
    self
  }

  /// Spawns every plugin under its own supervisor.
  pub fn run(self, app: Arc<AppState>) -> Vec<JoinHandle<()>> {
    self
      .plugins
      .into_iter()
      .map(|plugin| tokio::spawn(supervise(plugin, app.clone())))
      .collect()
  }
}

async fn supervise(plugin: Arc<dyn Plugin>, app: Arc<AppState>) {
  let name = plugin.name();
  info!(plugin = name, "Service started");

  loop {
    let (plugin, app) = (plugin.clone(), app.clone());
    let handle = tokio::spawn(async move { plugin.start(app).await });

    match handle.await {
      Ok(Ok(())) => warn!(plugin = name, "Service returned unexpectedly"),
      Ok(Err(err)) => error!(plugin = name, "Service crashed: {err:#}"),
      Err(err) if err.is_cancelled() => {
        info!(plugin = name, "Service shut down");
        return;
      }
      Err(_) => error!(plugin = name, "Service panicked"),
    }

    time::sleep(RESTART_DELAY).await;
    info!(plugin = name, "Restarting service");
  }
}
