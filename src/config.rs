use std::{collections::HashSet, env, str::FromStr};

use anyhow::{Context, bail};

use crate::{prelude::*, store::RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
  pub name: String,
  pub every: Duration,
  pub enabled: bool,
}

/// Paid out once per referrer when `referrals` paying users are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralThreshold {
  pub referrals: i32,
  pub reward: i64,
}

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub bot_token: String,
  pub admins: HashSet<i64>,
  pub admin_channel: Option<i64>,
  /// Send every successful payment to the admin channel
  pub notify_admin_payments: bool,
  pub secret: String,
  pub port: u16,
  pub currency: String,
  /// Where providers send the user after paying
  pub return_url: String,
  pub store_retry: RetryPolicy,
  pub gateway_timeout: Duration,
  pub provision_timeout: Duration,
  pub schedules: Vec<ScheduleConfig>,
  /// Stamp `warned_at` so each subscription is warned about expiry once
  pub warn_once: bool,
  /// How far back the pending-payment poller looks
  pub pending_poll_window: Duration,
  pub referral_thresholds: Vec<ReferralThreshold>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_url: String::from("sqlite:vpn.db?mode=rwc"),
      bot_token: String::new(),
      admins: HashSet::new(),
      admin_channel: None,
      notify_admin_payments: true,
      secret: String::new(),
      port: 3000,
      currency: String::from("RUB"),
      return_url: String::from("https://t.me/"),
      store_retry: RetryPolicy::default(),
      gateway_timeout: Duration::from_secs(15),
      provision_timeout: Duration::from_secs(20),
      schedules: parse_schedules(DEFAULT_SCHEDULES, &HashSet::new())
        .unwrap_or_default(),
      warn_once: false,
      pending_poll_window: Duration::from_secs(2 * 3600),
      referral_thresholds: parse_thresholds(DEFAULT_THRESHOLDS)
        .unwrap_or_default(),
    }
  }
}

const DEFAULT_SCHEDULES: &str =
  "expiry_warning=1h,deactivate_expired=10m,poll_pending=1m";
const DEFAULT_THRESHOLDS: &str = "1:5000,5:30000,10:70000";

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    let defaults = Self::default();

    let admins = required("ADMIN_IDS")?
      .split(',')
      .filter(|s| !s.trim().is_empty())
      .map(|id| id.trim().parse().context("Invalid admin ID format"))
      .collect::<anyhow::Result<HashSet<i64>>>()?;

    let disabled: HashSet<String> = env::var("SCHEDULES_DISABLED")
      .unwrap_or_default()
      .split(',')
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
      .collect();

    let schedules = parse_schedules(
      &env::var("SCHEDULES").unwrap_or_else(|_| DEFAULT_SCHEDULES.into()),
      &disabled,
    )?;

    let referral_thresholds = parse_thresholds(
      &env::var("REFERRAL_THRESHOLDS")
        .unwrap_or_else(|_| DEFAULT_THRESHOLDS.into()),
    )?;

    Ok(Self {
      database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
      bot_token: required("TELOXIDE_TOKEN")?,
      admins,
      admin_channel: optional("ADMIN_CHANNEL_ID")?,
      notify_admin_payments: optional("NOTIFY_ADMIN_PAYMENTS")?
        .unwrap_or(defaults.notify_admin_payments),
      secret: required("SERVER_SECRET")?,
      port: optional("PORT")?.unwrap_or(defaults.port),
      currency: env::var("CURRENCY").unwrap_or(defaults.currency),
      return_url: env::var("RETURN_URL").unwrap_or(defaults.return_url),
      store_retry: RetryPolicy {
        attempts: optional("STORE_RETRY_ATTEMPTS")?
          .unwrap_or(defaults.store_retry.attempts),
        base: duration("STORE_RETRY_BASE")?.unwrap_or(defaults.store_retry.base),
      },
      gateway_timeout: duration("GATEWAY_TIMEOUT")?
        .unwrap_or(defaults.gateway_timeout),
      provision_timeout: duration("PROVISION_TIMEOUT")?
        .unwrap_or(defaults.provision_timeout),
      schedules,
      warn_once: optional("WARN_ONCE")?.unwrap_or(defaults.warn_once),
      pending_poll_window: duration("PENDING_POLL_WINDOW")?
        .unwrap_or(defaults.pending_poll_window),
      referral_thresholds,
    })
  }
}

fn required(key: &str) -> anyhow::Result<String> {
  env::var(key).with_context(|| format!("{key} not set"))
}

fn optional<T>(key: &str) -> anyhow::Result<Option<T>>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  match env::var(key) {
    Ok(raw) => {
      Ok(Some(raw.trim().parse().with_context(|| format!("Invalid {key}"))?))
    }
    Err(_) => Ok(None),
  }
}

fn duration(key: &str) -> anyhow::Result<Option<Duration>> {
  match env::var(key) {
    Ok(raw) => Ok(Some(
      humantime::parse_duration(raw.trim())
        .with_context(|| format!("Invalid duration in {key}"))?,
    )),
    Err(_) => Ok(None),
  }
}

/// `name=interval,...`, e.g. `expiry_warning=1h,poll_pending=30s`.
fn parse_schedules(
  raw: &str,
  disabled: &HashSet<String>,
) -> anyhow::Result<Vec<ScheduleConfig>> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|entry| {
      let Some((name, every)) = entry.split_once('=') else {
        bail!("Schedule `{entry}` must look like name=interval");
      };
      let name = name.trim().to_string();
      let every = humantime::parse_duration(every.trim())
        .with_context(|| format!("Invalid interval for schedule `{name}`"))?;
      if every.is_zero() {
        bail!("Schedule `{name}` must have a non-zero interval");
      }
      let enabled = !disabled.contains(&name);
      Ok(ScheduleConfig { name, every, enabled })
    })
    .collect()
}

/// `referrals:reward,...` with rewards in minor units.
fn parse_thresholds(raw: &str) -> anyhow::Result<Vec<ReferralThreshold>> {
  let mut thresholds = raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|entry| {
      let (referrals, reward) = entry
        .split_once(':')
        .with_context(|| format!("Threshold `{entry}` must be count:reward"))?;
      Ok(ReferralThreshold {
        referrals: referrals.trim().parse()?,
        reward: reward.trim().parse()?,
      })
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

  thresholds.sort_by_key(|t| t.referrals);
  Ok(thresholds)
}
