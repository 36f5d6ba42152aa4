pub mod gateway_config;
pub mod payment;
pub mod payment_code;
pub mod promo_code;
pub mod raffle;
pub mod raffle_ticket;
pub mod referral_reward;
pub mod server;
pub mod subscription;
pub mod tariff;
pub mod transaction;
pub mod user;

pub use payment::{GatewayKind, PaymentStatus};
pub use server::Protocol;
pub use tariff::TariffKind;
pub use transaction::TransactionType;
