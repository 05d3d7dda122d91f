use crate::{parse_decimal_column, SqlWrapper};
use async_trait::async_trait;
use ph_types::catalog::{Attributes, CatalogRepository, Entity, EntityId};
use ph_types::{EntityKind, EntityStatus};
use rusqlite::{params, params_from_iter, Row};
use std::collections::HashMap;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Get, Save};
use typesafe_repository::{IdentityOf, Repository};

const ENTITY_COLUMNS: &str = "id, parent_id, kind, status, name, slug, price, menu_order";

pub struct SqliteCatalogRepository {
    conn: Connection,
}

impl SqliteCatalogRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS entity (
                    id INTEGER PRIMARY KEY,
                    parent_id INTEGER,
                    kind TEXT NOT NULL,
                    status TEXT NOT NULL,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL,
                    price TEXT,
                    menu_order INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS entity_parent ON entity (parent_id);
                CREATE TABLE IF NOT EXISTS entity_attribute (
                    entity_id INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (entity_id, name)
                );",
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

impl<'a, 'b> TryFrom<&'a Row<'b>> for SqlWrapper<Entity> {
    type Error = rusqlite::Error;

    fn try_from(row: &'a Row<'b>) -> Result<Self, Self::Error> {
        let kind: String = row.get(2)?;
        let status: String = row.get(3)?;
        let conversion = |idx: usize, err: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
        };
        Ok(SqlWrapper(Entity {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            kind: EntityKind::try_from(kind.as_str()).map_err(|err| conversion(2, err))?,
            status: EntityStatus::try_from(status.as_str()).map_err(|err| conversion(3, err))?,
            name: row.get(4)?,
            slug: row.get(5)?,
            price: row
                .get::<_, Option<String>>(6)?
                .map(|p| parse_decimal_column(6, &p))
                .transpose()?,
            menu_order: row.get(7)?,
            attributes: Attributes::new(),
        }))
    }
}

fn placeholders(from: usize, count: usize) -> String {
    itertools::intersperse((from..from + count).map(|i| format!("?{i}")), ",".to_string())
        .collect()
}

fn select_ids(
    conn: &rusqlite::Connection,
    variations: bool,
    statuses: &[EntityStatus],
) -> rusqlite::Result<Vec<EntityId>> {
    if statuses.is_empty() {
        return Ok(vec![]);
    }
    let kind_filter = if variations { "=" } else { "<>" };
    let query = format!(
        "SELECT DISTINCT id FROM entity WHERE kind {kind_filter} 'variation' AND status IN ({}) ORDER BY id",
        placeholders(1, statuses.len())
    );
    let mut stmt = conn.prepare(&query)?;
    let ids = stmt
        .query_map(params_from_iter(statuses.iter().map(ToString::to_string)), |row| {
            row.get::<_, EntityId>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Fills in attributes of the given entities with one query.
fn load_attributes(conn: &rusqlite::Connection, entities: &mut [Entity]) -> rusqlite::Result<()> {
    if entities.is_empty() {
        return Ok(());
    }
    let query = format!(
        "SELECT entity_id, name, value FROM entity_attribute WHERE entity_id IN ({})",
        placeholders(1, entities.len())
    );
    let mut stmt = conn.prepare(&query)?;
    let mut by_entity: HashMap<EntityId, Attributes> = HashMap::new();
    let rows = stmt.query_map(params_from_iter(entities.iter().map(|e| e.id)), |row| {
        Ok((
            row.get::<_, EntityId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (id, name, value) = row?;
        by_entity.entry(id).or_default().insert(name, value);
    }
    for e in entities.iter_mut() {
        if let Some(attributes) = by_entity.remove(&e.id) {
            e.attributes = attributes;
        }
    }
    Ok(())
}

fn select_entities(
    conn: &rusqlite::Connection,
    condition: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Entity>> {
    let mut stmt = conn.prepare(&format!("SELECT {ENTITY_COLUMNS} FROM entity {condition}"))?;
    let mut entities = stmt
        .query_map(params, |row| SqlWrapper::<Entity>::from_sql(row))?
        .collect::<Result<Vec<_>, _>>()?;
    load_attributes(conn, &mut entities)?;
    Ok(entities)
}

impl Repository<Entity> for SqliteCatalogRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Get<Entity> for SqliteCatalogRepository {
    async fn get_one(&self, id: &IdentityOf<Entity>) -> Result<Option<Entity>, Self::Error> {
        let id = *id;
        Ok(self
            .conn
            .call(move |conn| {
                let mut entities = select_entities(conn, "WHERE id = ?1", [id])?;
                Ok(entities.pop())
            })
            .await?)
    }
}

#[async_trait]
impl Save<Entity> for SqliteCatalogRepository {
    async fn save(&self, e: Entity) -> Result<(), Self::Error> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO entity (id, parent_id, kind, status, name, slug, price, menu_order)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(id)
                    DO UPDATE SET parent_id=?2, kind=?3, status=?4, name=?5, slug=?6, price=?7, menu_order=?8",
                    params![
                        e.id,
                        e.parent_id,
                        e.kind.to_string(),
                        e.status.to_string(),
                        e.name,
                        e.slug,
                        e.price.map(|p| p.to_string()),
                        e.menu_order,
                    ],
                )?;
                tx.execute("DELETE FROM entity_attribute WHERE entity_id = ?1", [e.id])?;
                for (name, value) in &e.attributes {
                    tx.execute(
                        "INSERT INTO entity_attribute (entity_id, name, value) VALUES (?1, ?2, ?3)",
                        params![e.id, name, value],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn product_ids(&self, statuses: &[EntityStatus]) -> Result<Vec<EntityId>, Self::Error> {
        let statuses = statuses.to_vec();
        Ok(self
            .conn
            .call(move |conn| Ok(select_ids(conn, false, &statuses)?))
            .await?)
    }

    async fn variation_ids(
        &self,
        statuses: &[EntityStatus],
    ) -> Result<Vec<EntityId>, Self::Error> {
        let statuses = statuses.to_vec();
        Ok(self
            .conn
            .call(move |conn| Ok(select_ids(conn, true, &statuses)?))
            .await?)
    }

    async fn children(&self, parent: &IdentityOf<Entity>) -> Result<Vec<Entity>, Self::Error> {
        let parent = *parent;
        Ok(self
            .conn
            .call(move |conn| {
                Ok(select_entities(
                    conn,
                    "WHERE parent_id = ?1 ORDER BY menu_order, id",
                    [parent],
                )?)
            })
            .await?)
    }

    async fn published_products(&self) -> Result<Vec<Entity>, Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                Ok(select_entities(
                    conn,
                    "WHERE kind <> 'variation' AND status = 'publish' ORDER BY name, id",
                    (),
                )?)
            })
            .await?)
    }
}
