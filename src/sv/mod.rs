//! Data access services.
//!
//! Each service borrows a connection. Pass a `DatabaseTransaction` to compose
//! several services into one atomic unit inside [`crate::store::Store::run`].

pub mod catalog;
pub mod gateway_config;
pub mod ledger;
pub mod payment;
pub mod pricing;
pub mod raffle;
pub mod referral;
pub mod subscription;
pub mod user;

pub use catalog::Catalog;
pub use gateway_config::GatewayConfig;
pub use ledger::Ledger;
pub use payment::Payment;
pub use pricing::Pricing;
pub use raffle::Raffle;
pub use referral::Referral;
pub use subscription::Subscription;
pub use user::User;
