use sea_orm::{Condition, sea_query::Expr};

use crate::{
  entity::{GatewayKind, PaymentStatus, payment},
  prelude::*,
};

pub struct Payment<'a, C> {
  db: &'a C,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
  pub reference: String,
  pub gateway: GatewayKind,
  pub user_id: i64,
  pub tariff_id: Option<i32>,
  pub amount: i64,
  pub topup: bool,
  pub promo_code: Option<String>,
  pub payment_code: Option<String>,
  pub status: PaymentStatus,
  pub redirect_url: Option<String>,
}

impl<'a, C: ConnectionTrait> Payment<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn create(&self, new: NewPayment) -> Result<payment::Model> {
    let now = utils::now();
    let payment = payment::ActiveModel {
      reference: Set(new.reference),
      gateway: Set(new.gateway),
      user_id: Set(new.user_id),
      tariff_id: Set(new.tariff_id),
      amount: Set(new.amount),
      topup: Set(new.topup),
      promo_code: Set(new.promo_code),
      payment_code: Set(new.payment_code),
      status: Set(new.status),
      redirect_url: Set(new.redirect_url),
      created_at: Set(now),
      updated_at: Set(now),
    };
    Ok(payment.insert(self.db).await?)
  }

  pub async fn by_reference(
    &self,
    reference: &str,
  ) -> Result<Option<payment::Model>> {
    Ok(payment::Entity::find_by_id(reference).one(self.db).await?)
  }

  pub async fn require(&self, reference: &str) -> Result<payment::Model> {
    self.by_reference(reference).await?.ok_or(Error::NotFound("payment"))
  }

  pub async fn set_status(
    &self,
    reference: &str,
    status: PaymentStatus,
  ) -> Result<()> {
    payment::Entity::update_many()
      .col_expr(payment::Column::Status, Expr::value(status))
      .col_expr(payment::Column::UpdatedAt, Expr::value(utils::now()))
      .filter(payment::Column::Reference.eq(reference))
      .exec(self.db)
      .await?;
    Ok(())
  }

  /// Compare-and-set on the status column. `false` when the row was not in
  /// `from` any more.
  pub async fn transition(
    &self,
    reference: &str,
    from: PaymentStatus,
    to: PaymentStatus,
  ) -> Result<bool> {
    let res = payment::Entity::update_many()
      .col_expr(payment::Column::Status, Expr::value(to))
      .col_expr(payment::Column::UpdatedAt, Expr::value(utils::now()))
      .filter(payment::Column::Reference.eq(reference))
      .filter(payment::Column::Status.eq(from))
      .exec(self.db)
      .await?;
    Ok(res.rows_affected == 1)
  }

  /// Payments the background poller should drive forward, newest first:
  /// captured ones of any gateway that never got activated, plus recent
  /// external ones still waiting for the provider.
  pub async fn unsettled(&self, since: DateTime) -> Result<Vec<payment::Model>> {
    let external =
      [GatewayKind::YooKassa, GatewayKind::CryptoPay, GatewayKind::PsPayments];

    let waiting = Condition::all()
      .add(payment::Column::Status.eq(PaymentStatus::Pending))
      .add(payment::Column::Gateway.is_in(external))
      .add(payment::Column::CreatedAt.gte(since));

    let payments = payment::Entity::find()
      .filter(
        Condition::any()
          .add(payment::Column::Status.eq(PaymentStatus::Paid))
          .add(waiting),
      )
      .order_by_desc(payment::Column::CreatedAt)
      .all(self.db)
      .await?;
    Ok(payments)
  }

  pub async fn by_user(&self, user_id: i64) -> Result<Vec<payment::Model>> {
    let payments = payment::Entity::find()
      .filter(payment::Column::UserId.eq(user_id))
      .order_by_desc(payment::Column::CreatedAt)
      .all(self.db)
      .await?;
    Ok(payments)
  }
}
