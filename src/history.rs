use crate::decimal_column;
use async_trait::async_trait;
use ph_types::history::{ForEntity, HistoryEntry, HistoryRepository};
use rusqlite::params;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Save, Select};
use typesafe_repository::Repository;

pub struct SqliteHistoryRepository {
    conn: Connection,
}

impl SqliteHistoryRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS price_history (
                entity_id INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                price TEXT NOT NULL,
                PRIMARY KEY (entity_id, timestamp)
            )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

impl Repository<HistoryEntry> for SqliteHistoryRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<HistoryEntry> for SqliteHistoryRepository {
    async fn save(&self, e: HistoryEntry) -> Result<(), Self::Error> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO price_history (entity_id, timestamp, price)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(entity_id, timestamp)
                    DO UPDATE SET price=?3",
                    params![e.entity_id, e.timestamp, e.price.to_string()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Select<HistoryEntry, ForEntity> for SqliteHistoryRepository {
    async fn select(&self, selector: &ForEntity) -> Result<Vec<HistoryEntry>, Self::Error> {
        let id = selector.0;
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT entity_id, timestamp, price FROM price_history
                    WHERE entity_id = ?1 ORDER BY timestamp",
                )?;
                let entries = stmt
                    .query_map([id], |row| {
                        Ok(HistoryEntry {
                            entity_id: row.get(0)?,
                            timestamp: row.get(1)?,
                            price: decimal_column(row, 2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?)
    }
}

impl HistoryRepository for SqliteHistoryRepository {}
