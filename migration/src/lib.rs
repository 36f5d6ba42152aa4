pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_users;
mod m20261001_000002_create_catalog;
mod m20261001_000003_create_payments;
mod m20261001_000004_create_subscriptions;
mod m20261001_000005_create_transactions;
mod m20261001_000006_create_codes;
mod m20261001_000007_create_raffles;
mod m20261001_000008_create_referral_rewards;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20261001_000001_create_users::Migration),
      Box::new(m20261001_000002_create_catalog::Migration),
      Box::new(m20261001_000003_create_payments::Migration),
      Box::new(m20261001_000004_create_subscriptions::Migration),
      Box::new(m20261001_000005_create_transactions::Migration),
      Box::new(m20261001_000006_create_codes::Migration),
      Box::new(m20261001_000007_create_raffles::Migration),
      Box::new(m20261001_000008_create_referral_rewards::Migration),
    ]
  }
}
