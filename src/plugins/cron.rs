//! Periodic housekeeping: expiry warnings, the expired-subscription sweep and
//! the pending-payment poller, each on its own named schedule.

use std::time::Instant;

use crate::{
  checkout::Confirmation,
  config::ScheduleConfig,
  notify::{self, Notifier},
  prelude::*,
  state::AppState,
  sv,
};

/// How often the loop wakes up to look for due jobs.
const TICK: Duration = Duration::from_secs(1);

#[async_trait]
pub trait Job: Send + Sync {
  fn name(&self) -> &'static str;

  async fn run(&self, app: &AppState) -> Result<()>;
}

pub struct Schedule {
  job: Box<dyn Job>,
  every: Duration,
  last: Option<Instant>,
}

impl Schedule {
  pub fn new(job: impl Job + 'static, every: Duration) -> Self {
    Self { job: Box::new(job), every, last: None }
  }
}

/// A job that never ran is due immediately.
pub fn due(last: Option<Instant>, every: Duration, now: Instant) -> bool {
  match last {
    None => true,
    Some(last) => now.saturating_duration_since(last) >= every,
  }
}

#[derive(Default)]
pub struct Scheduler {
  schedules: Vec<Schedule>,
}

impl Scheduler {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, schedule: Schedule) -> Self {
    self.schedules.push(schedule);
    self
  }

  /// Builds the known jobs from configuration. Disabled and unknown names are
  /// skipped.
  pub fn from_config(configs: &[ScheduleConfig]) -> Self {
    configs.iter().fold(Self::new(), |scheduler, config| {
      if !config.enabled {
        info!(schedule = config.name, "Schedule disabled");
        return scheduler;
      }
      let every = config.every;
      match config.name.as_str() {
        "expiry_warning" => scheduler.with(Schedule::new(ExpiryWarning, every)),
        "deactivate_expired" => {
          scheduler.with(Schedule::new(DeactivateExpired, every))
        }
        "poll_pending" => scheduler.with(Schedule::new(PollPending, every)),
        unknown => {
          warn!(schedule = unknown, "Unknown schedule, ignoring");
          scheduler
        }
      }
    })
  }

  pub fn names(&self) -> Vec<&'static str> {
    self.schedules.iter().map(|s| s.job.name()).collect()
  }

  /// Runs every due job once, in registration order. Returns the jobs that
  /// ran. A failing job is logged and does not stop the others.
  pub async fn tick(
    &mut self,
    app: &AppState,
    now: Instant,
  ) -> Vec<&'static str> {
    let mut ran = Vec::new();
    for schedule in &mut self.schedules {
      if !due(schedule.last, schedule.every, now) {
        continue;
      }
      schedule.last = Some(now);

      let name = schedule.job.name();
      if let Err(err) = schedule.job.run(app).await {
        error!(job = name, "Job failed: {err}");
      }
      ran.push(name);
    }
    ran
  }
}

/// Tells users their subscription ends within a day. Repeats on every run
/// unless `warn_once` is set.
pub struct ExpiryWarning;

#[async_trait]
impl Job for ExpiryWarning {
  fn name(&self) -> &'static str {
    "expiry_warning"
  }

  async fn run(&self, app: &AppState) -> Result<()> {
    let now = utils::now();
    let once = app.config.warn_once;

    let expiring = app
      .store
      .read(move |db| {
        Box::pin(async move {
          sv::Subscription::new(db)
            .expiring_within(now, TimeDelta::hours(24), once)
            .await
        })
      })
      .await?;

    for sub in &expiring {
      let text = notify::expiry_warning(sub, sub.expires_at - now);
      app.notifier.notify_user(sub.user_id, &text).await;

      if once {
        let id = sub.id;
        app
          .store
          .run(move |txn| {
            Box::pin(async move {
              sv::Subscription::new(txn).mark_warned(id, now).await
            })
          })
          .await?;
      }
    }

    if !expiring.is_empty() {
      info!(count = expiring.len(), "Expiry warnings sent");
    }
    Ok(())
  }
}

pub struct DeactivateExpired;

#[async_trait]
impl Job for DeactivateExpired {
  fn name(&self) -> &'static str {
    "deactivate_expired"
  }

  async fn run(&self, app: &AppState) -> Result<()> {
    let now = utils::now();
    let expired = app
      .store
      .run(move |txn| {
        Box::pin(async move {
          sv::Subscription::new(txn).deactivate_expired(now).await
        })
      })
      .await?;

    if expired > 0 {
      info!(expired, "Expired subscriptions deactivated");
    }
    Ok(())
  }
}

/// Confirms payments nobody asked about, racing the user's "check payment"
/// button through the same guard. Picks up captured payments whose
/// activation never finished too.
pub struct PollPending;

#[async_trait]
impl Job for PollPending {
  fn name(&self) -> &'static str {
    "poll_pending"
  }

  async fn run(&self, app: &AppState) -> Result<()> {
    let window = TimeDelta::from_std(app.config.pending_poll_window)
      .map_err(|_| Error::validation("pending poll window is too large"))?;
    let since = utils::now() - window;

    let unsettled = app
      .store
      .read(move |db| {
        Box::pin(async move {
          sv::Payment::new(db).unsettled(since).await
        })
      })
      .await?;

    for payment in unsettled {
      let reference = payment.reference;
      match app.activator().confirm(&reference).await {
        Ok(Confirmation::Pending) => {}
        Ok(outcome) => debug!(reference, ?outcome, "Pending payment settled"),
        Err(err) => warn!(reference, "Poll failed: {err}"),
      }
    }
    Ok(())
  }
}

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  fn name(&self) -> &'static str {
    "cron"
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let mut scheduler = Scheduler::from_config(&app.config.schedules);
    info!(jobs = ?scheduler.names(), "Scheduler running");

    let mut interval = time::interval(TICK);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
      interval.tick().await;
      scheduler.tick(&app, Instant::now()).await;
    }
  }
}
