//! Append-only balance ledger.
//!
//! The balance of a user is the sum of its non-pending rows. `users.balance`
//! is a cache that every posting updates in the same statement batch, so
//! callers must post through a transaction to keep both in step.

use sea_orm::sea_query::Expr;

use crate::{
  entity::{TransactionType, transaction, user},
  prelude::*,
};

pub struct Ledger<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Ledger<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn post(
    &self,
    tg_user_id: i64,
    amount: i64,
    ty: TransactionType,
    description: impl Into<String>,
    reference: Option<String>,
  ) -> Result<transaction::Model> {
    let row = transaction::ActiveModel {
      user_id: Set(tg_user_id),
      amount: Set(amount),
      tx_type: Set(ty),
      description: Set(Some(description.into())),
      payment_reference: Set(reference),
      created_at: Set(utils::now()),
      ..Default::default()
    }
    .insert(self.db)
    .await?;

    if ty.counts_to_balance() {
      user::Entity::update_many()
        .col_expr(
          user::Column::Balance,
          Expr::col(user::Column::Balance).add(amount),
        )
        .filter(user::Column::TgUserId.eq(tg_user_id))
        .exec(self.db)
        .await?;
    }

    debug!(user = tg_user_id, amount, ?ty, "Ledger entry");
    Ok(row)
  }

  /// Authoritative balance.
  pub async fn sum(&self, tg_user_id: i64) -> Result<i64> {
    let sum = transaction::Entity::find()
      .select_only()
      .column_as(transaction::Column::Amount.sum(), "total")
      .filter(transaction::Column::UserId.eq(tg_user_id))
      .filter(transaction::Column::TxType.ne(TransactionType::Pending))
      .into_tuple::<Option<i64>>()
      .one(self.db)
      .await?
      .flatten();
    Ok(sum.unwrap_or(0))
  }

  pub async fn by_reference(
    &self,
    reference: &str,
    ty: TransactionType,
  ) -> Result<Option<transaction::Model>> {
    let row = transaction::Entity::find()
      .filter(transaction::Column::PaymentReference.eq(reference))
      .filter(transaction::Column::TxType.eq(ty))
      .one(self.db)
      .await?;
    Ok(row)
  }

  pub async fn history(
    &self,
    tg_user_id: i64,
    limit: u64,
  ) -> Result<Vec<transaction::Model>> {
    let rows = transaction::Entity::find()
      .filter(transaction::Column::UserId.eq(tg_user_id))
      .order_by_desc(transaction::Column::CreatedAt)
      .order_by_desc(transaction::Column::Id)
      .limit(limit)
      .all(self.db)
      .await?;
    Ok(rows)
  }

  /// Moves `amount` between two users. Both rows land or neither does, as
  /// long as `db` is a transaction.
  pub async fn transfer(&self, from: i64, to: i64, amount: i64) -> Result<i64> {
    if amount <= 0 {
      return Err(Error::validation("transfer amount must be positive"));
    }
    if from == to {
      return Err(Error::validation("cannot transfer to yourself"));
    }

    let recipient = user::Entity::find_by_id(to).one(self.db).await?;
    if recipient.is_none() {
      return Err(Error::NotFound("recipient"));
    }

    let available = self.sum(from).await?;
    if available < amount {
      return Err(Error::InsufficientFunds { required: amount, available });
    }

    self
      .post(
        from,
        -amount,
        TransactionType::TransferOut,
        format!("Transfer to {to}"),
        None,
      )
      .await?;
    self
      .post(
        to,
        amount,
        TransactionType::TransferIn,
        format!("Transfer from {from}"),
        None,
      )
      .await?;

    info!(from, to, amount, "Balance transferred");
    Ok(available - amount)
  }
}
