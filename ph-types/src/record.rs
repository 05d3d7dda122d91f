use crate::catalog::EntityId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One exported row: an entity with its live and lowest recent price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: EntityId,
    pub title: String,
    pub permalink: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub lowest_price: Decimal,
}
