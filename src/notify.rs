//! Outbound chat messages. Delivery is best-effort: failures are logged and
//! dropped, nothing is retried or queued.

use teloxide::{
  Bot,
  payloads::SendMessageSetters,
  prelude::Requester,
  types::{ChatId, ParseMode},
  utils::html::escape,
};

use crate::{
  entity::{payment, subscription, tariff},
  prelude::*,
};

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify_user(&self, tg_user_id: i64, text: &str);

  async fn notify_admin_channel(&self, text: &str);
}

pub struct TelegramNotifier {
  bot: Bot,
  admin_channel: Option<i64>,
  admins: Vec<i64>,
}

impl TelegramNotifier {
  pub fn new(bot: Bot, admin_channel: Option<i64>, admins: Vec<i64>) -> Self {
    Self { bot, admin_channel, admins }
  }

  async fn send(&self, chat_id: i64, text: &str) {
    for chunk in utils::chunk_message(text, 0) {
      if let Err(err) = self
        .bot
        .send_message(ChatId(chat_id), chunk)
        .parse_mode(ParseMode::Html)
        .await
      {
        warn!(chat_id, "Failed to deliver message: {err}");
        return;
      }
    }
  }
}

#[async_trait]
impl Notifier for TelegramNotifier {
  async fn notify_user(&self, tg_user_id: i64, text: &str) {
    self.send(tg_user_id, text).await;
  }

  async fn notify_admin_channel(&self, text: &str) {
    match self.admin_channel {
      Some(channel) => self.send(channel, text).await,
      None => {
        for &admin in &self.admins {
          self.send(admin, text).await;
        }
      }
    }
  }
}

pub fn activated(tariff: &tariff::Model, sub: &subscription::Model) -> String {
  format!(
    "✅ <b>Subscription activated</b>\n\n\
     Tariff: <b>{}</b>\n\
     Valid until: {}\n\n\
     Your connection link:\n<code>{}</code>",
    escape(&tariff.name),
    utils::format_date(sub.expires_at),
    escape(&sub.credential),
  )
}

pub fn deposited(amount: i64, balance: i64) -> String {
  format!(
    "💰 Balance topped up by <b>{}</b>\nCurrent balance: <b>{}</b>",
    utils::format_money(amount),
    utils::format_money(balance),
  )
}

pub fn support(reference: &str) -> String {
  format!(
    "⏳ Your payment has been received and is being processed.\n\
     Activation is taking longer than usual, please contact support and \
     mention <code>{}</code>.",
    escape(reference),
  )
}

pub fn refunded(amount: i64) -> String {
  format!(
    "⚠️ We could not set up your subscription. <b>{}</b> has been returned \
     to your balance.",
    utils::format_money(amount),
  )
}

pub fn code_restored() -> String {
  "⚠️ We could not set up your subscription. Your payment code is valid \
   again, please try later."
    .to_string()
}

pub fn expiry_warning(sub: &subscription::Model, left: TimeDelta) -> String {
  format!(
    "⏰ Your subscription expires in <b>{}</b> ({}).\nRenew it to stay \
     connected.",
    utils::format_duration(left),
    utils::format_date(sub.expires_at),
  )
}

pub fn referral_reward(amount: i64, referrals: i32) -> String {
  format!(
    "🎉 {referrals} of your friends joined! <b>{}</b> was added to your \
     balance.",
    utils::format_money(amount),
  )
}

pub fn admin_payment(payment: &payment::Model, tariff: Option<&str>) -> String {
  let what = match tariff {
    Some(name) => escape(name),
    None => "balance top-up".to_string(),
  };
  format!(
    "💳 <b>Payment</b> {}\nUser: <code>{}</code>\nAmount: {}\nFor: {}\nVia: {}",
    escape(&payment.reference),
    payment.user_id,
    utils::format_money(payment.amount),
    what,
    payment.gateway,
  )
}

pub fn admin_incident(payment: &payment::Model, reason: &str) -> String {
  format!(
    "🚨 <b>Activation failed</b> {}\nUser: <code>{}</code>\nReason: {}",
    escape(&payment.reference),
    payment.user_id,
    escape(reason),
  )
}
