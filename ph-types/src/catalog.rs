use crate::{EntityKind, EntityStatus};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use typesafe_repository::async_ops::{Get, Save};
use typesafe_repository::macros::Id;
use typesafe_repository::{GetIdentity, Identity, IdentityOf, RefIdentity, Repository};
use url::form_urlencoded;

pub type EntityId = u64;

/// Attribute name to value, as stored on a variation.
pub type Attributes = BTreeMap<String, String>;

/// Product or variation of the host catalog.
#[derive(Id, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[Id(ref_id, get_id)]
pub struct Entity {
    #[id]
    pub id: EntityId,
    pub parent_id: Option<EntityId>,
    pub kind: EntityKind,
    pub status: EntityStatus,
    pub name: String,
    pub slug: String,
    pub price: Option<Decimal>,
    pub menu_order: i64,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Entity {
    /// Trashed entities are treated as if they were deleted.
    pub fn resolves(&self) -> bool {
        self.status != EntityStatus::Trash
    }

    pub fn is_variable(&self) -> bool {
        self.kind == EntityKind::Variable
    }

    pub fn is_variation(&self) -> bool {
        self.kind == EntityKind::Variation
    }

    pub fn live_price(&self) -> Decimal {
        self.price.unwrap_or(Decimal::ZERO)
    }

    /// Variation that can currently be bought: published and priced.
    pub fn is_live_variant(&self) -> bool {
        self.is_variation() && self.status == EntityStatus::Publish && self.price.is_some()
    }

    pub fn permalink(&self, site_url: &str, parent: Option<&Entity>) -> String {
        let site_url = site_url.trim_end_matches('/');
        match parent {
            Some(parent) if self.is_variation() => {
                let base = parent.permalink(site_url, None);
                let mut query = form_urlencoded::Serializer::new(String::new());
                for (name, value) in self.attributes.iter().filter(|(_, v)| !v.is_empty()) {
                    query.append_pair(&format!("attribute_{name}"), value);
                }
                let query = query.finish();
                if query.is_empty() {
                    base
                } else {
                    format!("{base}?{query}")
                }
            }
            _ => format!("{site_url}/product/{}/", self.slug),
        }
    }
}

#[async_trait]
pub trait CatalogRepository:
    Repository<Entity, Error = anyhow::Error> + Get<Entity> + Save<Entity> + Send + Sync
{
    /// IDs of top level products in any of `statuses`, ascending.
    async fn product_ids(&self, statuses: &[EntityStatus]) -> Result<Vec<EntityId>, Self::Error>;

    /// IDs of variations in any of `statuses`, ascending.
    async fn variation_ids(&self, statuses: &[EntityStatus])
        -> Result<Vec<EntityId>, Self::Error>;

    /// Direct children ordered by `menu_order`, then `id`.
    async fn children(&self, parent: &IdentityOf<Entity>) -> Result<Vec<Entity>, Self::Error>;

    /// Published top level products ordered by name.
    async fn published_products(&self) -> Result<Vec<Entity>, Self::Error>;

    async fn resolve(&self, id: &IdentityOf<Entity>) -> Result<Option<Entity>, Self::Error> {
        Ok(self.get_one(id).await?.filter(Entity::resolves))
    }

    async fn live_variants(&self, parent: &IdentityOf<Entity>) -> Result<Vec<Entity>, Self::Error> {
        Ok(self
            .children(parent)
            .await?
            .into_iter()
            .filter(Entity::is_live_variant)
            .collect())
    }
}
