use crate::{
  entity::{raffle, raffle_ticket},
  prelude::*,
};

/// Tickets granted for a paid tariff of `days` length. Tier bounds are
/// inclusive and the first matching tier wins.
pub fn tickets_for_days(days: i32) -> i32 {
  const TIERS: [(i32, i32); 4] = [(31, 1), (62, 3), (180, 9), (365, 18)];

  TIERS
    .iter()
    .find(|(max_days, _)| days <= *max_days)
    .map_or(60, |(_, tickets)| *tickets)
}

pub struct Raffle<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Raffle<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn create(&self, name: &str) -> Result<raffle::Model> {
    let raffle = raffle::ActiveModel {
      name: Set(name.to_string()),
      is_active: Set(true),
      created_at: Set(utils::now()),
      ..Default::default()
    };
    Ok(raffle.insert(self.db).await?)
  }

  /// The most recent running raffle, if any.
  pub async fn active(&self) -> Result<Option<raffle::Model>> {
    let raffle = raffle::Entity::find()
      .filter(raffle::Column::IsActive.eq(true))
      .order_by_desc(raffle::Column::CreatedAt)
      .one(self.db)
      .await?;
    Ok(raffle)
  }

  /// Appends `count` sequential tickets to the raffle and returns their
  /// numbers. Numbers are unique per raffle.
  pub async fn issue(
    &self,
    raffle_id: i32,
    user_id: i64,
    count: i32,
    reference: Option<&str>,
  ) -> Result<Vec<i32>> {
    let last: Option<i32> = raffle_ticket::Entity::find()
      .select_only()
      .column_as(raffle_ticket::Column::Number.max(), "last")
      .filter(raffle_ticket::Column::RaffleId.eq(raffle_id))
      .into_tuple::<Option<i32>>()
      .one(self.db)
      .await?
      .flatten();

    let first = last.unwrap_or(0) + 1;
    let numbers: Vec<i32> = (first..first + count).collect();
    if numbers.is_empty() {
      return Ok(numbers);
    }

    let now = utils::now();
    let tickets = numbers.iter().map(|&number| raffle_ticket::ActiveModel {
      raffle_id: Set(raffle_id),
      user_id: Set(user_id),
      number: Set(number),
      payment_reference: Set(reference.map(str::to_string)),
      created_at: Set(now),
      ..Default::default()
    });
    raffle_ticket::Entity::insert_many(tickets).exec(self.db).await?;

    info!(user = user_id, raffle = raffle_id, count, "Issued raffle tickets");
    Ok(numbers)
  }

  pub async fn tickets_of(
    &self,
    raffle_id: i32,
    user_id: i64,
  ) -> Result<Vec<raffle_ticket::Model>> {
    let tickets = raffle_ticket::Entity::find()
      .filter(raffle_ticket::Column::RaffleId.eq(raffle_id))
      .filter(raffle_ticket::Column::UserId.eq(user_id))
      .order_by_asc(raffle_ticket::Column::Number)
      .all(self.db)
      .await?;
    Ok(tickets)
  }
}
