use crate::catalog::EntityId;
use crate::SECONDS_PER_DAY;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use typesafe_repository::async_ops::{Save, Select};
use typesafe_repository::{GetIdentity, Identity, Repository, SelectBy, Selector};

/// Single price observation of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entity_id: EntityId,
    pub price: Decimal,
    /// Unix timestamp, seconds.
    pub timestamp: i64,
}

impl Identity for HistoryEntry {
    type Id = (EntityId, i64);
}

impl GetIdentity for HistoryEntry {
    fn id(&self) -> Self::Id {
        (self.entity_id, self.timestamp)
    }
}

/// All entries of one entity, ordered by timestamp.
pub struct ForEntity(pub EntityId);

impl Selector for ForEntity {}
impl SelectBy<ForEntity> for HistoryEntry {}

#[async_trait]
pub trait HistoryRepository:
    Repository<HistoryEntry, Error = anyhow::Error>
    + Save<HistoryEntry>
    + Select<HistoryEntry, ForEntity>
    + Send
    + Sync
{
    async fn get_minimal(&self, id: EntityId, window_days: u32) -> Result<Decimal, Self::Error> {
        let entries = self.select(&ForEntity(id)).await?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Ok(minimal_price(&entries, now, window_days))
    }

    /// Writing a timestamp that is already recorded replaces its price.
    async fn add_historical_price(
        &self,
        id: EntityId,
        price: Decimal,
        timestamp: i64,
    ) -> Result<(), Self::Error> {
        self.save(HistoryEntry {
            entity_id: id,
            price,
            timestamp,
        })
        .await
    }
}

/// Lowest price seen during the `window_days` before `now`, including the
/// price that was already in effect when the window opened.
pub fn minimal_price(entries: &[HistoryEntry], now: i64, window_days: u32) -> Decimal {
    let start = now - i64::from(window_days) * SECONDS_PER_DAY;
    let opening = entries
        .iter()
        .filter(|e| e.timestamp <= start)
        .max_by_key(|e| e.timestamp);
    entries
        .iter()
        .filter(|e| e.timestamp > start && e.timestamp <= now)
        .chain(opening)
        .map(|e| e.price)
        .min()
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
pub mod test {
    use super::*;
    use rust_decimal_macros::dec;

    const NOW: i64 = 1_700_000_000;

    fn entry(days_ago: i64, price: Decimal) -> HistoryEntry {
        HistoryEntry {
            entity_id: 1,
            price,
            timestamp: NOW - days_ago * SECONDS_PER_DAY,
        }
    }

    #[test]
    fn empty_history_is_zero() {
        assert_eq!(Decimal::ZERO, minimal_price(&[], NOW, 30));
    }

    #[test]
    fn takes_lowest_inside_window() {
        let entries = [entry(20, dec!(12.5)), entry(10, dec!(9.99)), entry(1, dec!(11))];
        assert_eq!(dec!(9.99), minimal_price(&entries, NOW, 30));
    }

    #[test]
    fn includes_price_in_effect_at_window_start() {
        let entries = [entry(90, dec!(3)), entry(45, dec!(8)), entry(5, dec!(10))];
        assert_eq!(dec!(8), minimal_price(&entries, NOW, 30));
    }

    #[test]
    fn ignores_future_entries() {
        let entries = [entry(-2, dec!(1)), entry(3, dec!(5))];
        assert_eq!(dec!(5), minimal_price(&entries, NOW, 30));
    }
}
