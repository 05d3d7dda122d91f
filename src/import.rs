use crate::php;
use derive_more::{Display, Error};
use ph_types::catalog::{CatalogRepository, Entity, EntityId};
use ph_types::history::{ForEntity, HistoryRepository};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use std::str::FromStr;
use std::sync::Arc;
use typesafe_repository::async_ops::Select;

pub mod controllers;

#[derive(Debug, Display, Error)]
pub enum ImportError {
    #[display("No import data provided")]
    NoData,
    #[display("Invalid JSON data")]
    InvalidFormat,
    #[display("Invalid data format. Expected product_name and serialized fields.")]
    MissingFields,
    #[error(ignore)]
    #[display("Failed to decode serialized data: {_0}")]
    DecodeFailure(String),
    #[error(ignore)]
    #[display("Target product {_0} not found")]
    TargetNotFound(EntityId),
    #[error(ignore)]
    #[display("Unable to store price history: {_0}")]
    Storage(anyhow::Error),
}

impl From<php::DecodeError> for ImportError {
    fn from(err: php::DecodeError) -> Self {
        Self::DecodeFailure(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: Decimal,
}

/// Attribute value as found in an import file.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    /// Arrays and objects. Never compared.
    Composite,
    /// Numbers, booleans, null. Never equal to a stored value.
    Other,
}

impl From<&php::Value> for AttributeValue {
    fn from(v: &php::Value) -> Self {
        match v {
            php::Value::String(s) => Self::Text(s.clone()),
            php::Value::Array(_) | php::Value::Object { .. } => Self::Composite,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariationHistory {
    pub attributes: Vec<(String, AttributeValue)>,
    pub history: Vec<PricePoint>,
}

/// Decoded contents of the `serialized` field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryBlob {
    pub product_history: Vec<PricePoint>,
    /// Only variations that carry a history.
    pub variations: Vec<VariationHistory>,
}

impl TryFrom<&php::Value> for HistoryBlob {
    type Error = ImportError;

    fn try_from(value: &php::Value) -> Result<Self, Self::Error> {
        if value.as_array().is_none() {
            return Err(ImportError::DecodeFailure(
                "decoded data is not an array".to_string(),
            ));
        }
        let product_history = match value
            .get("product")
            .and_then(|p| p.get("history"))
            .and_then(php::Value::as_array)
        {
            Some(entries) => price_points(entries)?,
            None => Vec::new(),
        };
        let mut variations = Vec::new();
        for (_, variation) in value
            .get("variations")
            .and_then(php::Value::as_array)
            .unwrap_or_default()
        {
            let Some(history) = variation.get("history").and_then(php::Value::as_array) else {
                continue;
            };
            let attributes = variation
                .get("attributes")
                .and_then(php::Value::as_array)
                .unwrap_or_default()
                .iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect();
            variations.push(VariationHistory {
                attributes,
                history: price_points(history)?,
            });
        }
        Ok(Self {
            product_history,
            variations,
        })
    }
}

fn price_points(entries: &[(php::Key, php::Value)]) -> Result<Vec<PricePoint>, ImportError> {
    entries
        .iter()
        .map(|(key, value)| {
            Ok(PricePoint {
                timestamp: timestamp(key)?,
                price: price(value)?,
            })
        })
        .collect()
}

fn timestamp(key: &php::Key) -> Result<i64, ImportError> {
    match key {
        php::Key::Int(ts) => Ok(*ts),
        php::Key::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| ImportError::DecodeFailure(format!("invalid timestamp {s:?}"))),
    }
}

fn price(value: &php::Value) -> Result<Decimal, ImportError> {
    let invalid = || ImportError::DecodeFailure(format!("invalid price {value:?}"));
    match value {
        php::Value::Int(i) => Ok(Decimal::from(*i)),
        php::Value::Float(f) => Decimal::from_f64(*f).ok_or_else(invalid),
        php::Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

/// Import file as uploaded by the user.
#[derive(Debug)]
pub struct ImportFile {
    pub product_name: String,
    pub blob: HistoryBlob,
}

/// Validation order matters, the first failing gate decides the error.
pub fn parse_import_file(raw: &str) -> Result<ImportFile, ImportError> {
    if raw.trim().is_empty() {
        return Err(ImportError::NoData);
    }
    let data: Json = serde_json::from_str(raw).map_err(|_| ImportError::InvalidFormat)?;
    if !php::Value::from(data.clone()).is_truthy() {
        return Err(ImportError::InvalidFormat);
    }
    let (product_name, serialized) = match (data.get("product_name"), data.get("serialized")) {
        (Some(name), Some(serialized)) if !name.is_null() && !serialized.is_null() => {
            (name, serialized)
        }
        _ => return Err(ImportError::MissingFields),
    };
    let decoded = match serialized {
        Json::String(s) => php::from_str(s)?,
        Json::Object(_) | Json::Array(_) => php::Value::from(serialized.clone()),
        other => {
            return Err(ImportError::DecodeFailure(format!(
                "unexpected serialized value {other}"
            )))
        }
    };
    if !decoded.is_truthy() {
        return Err(ImportError::DecodeFailure(
            "decoded data is empty".to_string(),
        ));
    }
    let product_name = match product_name {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(ImportFile {
        product_name,
        blob: HistoryBlob::try_from(&decoded)?,
    })
}

/// First variant on which every comparable source attribute agrees.
/// Attributes the variant doesn't carry are ignored.
pub fn find_matching_variation<'a>(
    variants: &'a [Entity],
    source: &[(String, AttributeValue)],
) -> Option<&'a Entity> {
    variants.iter().find(|variant| {
        source
            .iter()
            .all(|(name, value)| match (variant.attributes.get(name), value) {
                (None, _) | (Some(_), AttributeValue::Composite) => true,
                (Some(stored), AttributeValue::Text(text)) => stored == text,
                (Some(_), AttributeValue::Other) => false,
            })
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub message: String,
    pub imported_count: usize,
}

/// History file produced by [`Importer::export_history`] and accepted by
/// [`Importer::import`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryFile {
    pub product_name: String,
    pub serialized: Json,
}

pub struct Importer {
    catalog: Arc<dyn CatalogRepository>,
    history: Arc<dyn HistoryRepository>,
}

impl Importer {
    pub fn new(catalog: Arc<dyn CatalogRepository>, history: Arc<dyn HistoryRepository>) -> Self {
        Self { catalog, history }
    }

    pub async fn import(&self, target: EntityId, raw: &str) -> Result<ImportSummary, ImportError> {
        let file = parse_import_file(raw)?;
        let target = self
            .catalog
            .resolve(&target)
            .await
            .map_err(ImportError::Storage)?
            .ok_or(ImportError::TargetNotFound(target))?;
        log::info!(
            "Importing price history of \"{}\" into {} ({})",
            file.product_name,
            target.id,
            target.name
        );
        let mut imported_count = self.write(target.id, &file.blob.product_history).await?;
        if target.is_variable() && !file.blob.variations.is_empty() {
            let variants = self
                .catalog
                .live_variants(&target.id)
                .await
                .map_err(ImportError::Storage)?;
            for variation in &file.blob.variations {
                match find_matching_variation(&variants, &variation.attributes) {
                    Some(variant) => {
                        imported_count += self.write(variant.id, &variation.history).await?
                    }
                    None => log::debug!(
                        "No variation of {} matches {:?}",
                        target.id,
                        variation.attributes
                    ),
                }
            }
        }
        Ok(ImportSummary {
            message: format!(
                "Successfully imported {imported_count} price history entries for product \"{}\"",
                target.name
            ),
            imported_count,
        })
    }

    async fn write(&self, id: EntityId, points: &[PricePoint]) -> Result<usize, ImportError> {
        for p in points {
            self.history
                .add_historical_price(id, p.price, p.timestamp)
                .await
                .map_err(ImportError::Storage)?;
        }
        Ok(points.len())
    }

    /// Builds an import file from the stored history of `id` and its live variants.
    pub async fn export_history(&self, id: EntityId) -> Result<HistoryFile, ImportError> {
        let entity = self
            .catalog
            .resolve(&id)
            .await
            .map_err(ImportError::Storage)?
            .ok_or(ImportError::TargetNotFound(id))?;
        let mut variations = Vec::new();
        if entity.is_variable() {
            let variants = self
                .catalog
                .live_variants(&id)
                .await
                .map_err(ImportError::Storage)?;
            for variant in variants {
                let history = self.history_map(variant.id).await?;
                variations.push(json!({
                    "attributes": variant.attributes,
                    "history": history,
                }));
            }
        }
        let history = self.history_map(id).await?;
        Ok(HistoryFile {
            product_name: entity.name,
            serialized: json!({
                "product": { "history": history },
                "variations": variations,
            }),
        })
    }

    async fn history_map(&self, id: EntityId) -> Result<Map<String, Json>, ImportError> {
        Ok(self
            .history
            .select(&ForEntity(id))
            .await
            .map_err(ImportError::Storage)?
            .into_iter()
            .map(|e| {
                (
                    e.timestamp.to_string(),
                    Json::String(e.price.normalize().to_string()),
                )
            })
            .collect())
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::catalog::test::{entity, repository as catalog, variation};
    use crate::history::test::repository as history;
    use ph_types::{EntityKind, EntityStatus};
    use rust_decimal_macros::dec;

    const SHIRT_FILE: &str = r#"{
        "product_name": "Shirt",
        "serialized": "a:2:{s:7:\"product\";a:1:{s:7:\"history\";a:0:{}}s:10:\"variations\";a:1:{i:0;a:2:{s:10:\"attributes\";a:1:{s:8:\"pa_color\";s:4:\"blue\";}s:7:\"history\";a:1:{i:1700000000;d:12.5;}}}}"
    }"#;

    async fn importer(entities: Vec<Entity>) -> Importer {
        Importer::new(
            Arc::new(catalog(entities).await),
            Arc::new(history().await),
        )
    }

    fn shirt() -> Vec<Entity> {
        vec![
            entity(1, EntityKind::Variable, EntityStatus::Publish),
            variation(2, 1, &[("pa_color", "red")]),
            variation(3, 1, &[("pa_color", "blue")]),
        ]
    }

    fn text(name: &str, value: &str) -> (String, AttributeValue) {
        (name.to_string(), AttributeValue::Text(value.to_string()))
    }

    #[test]
    fn matches_first_variant_with_equal_attributes() {
        let variants = shirt().split_off(1);
        let found = find_matching_variation(&variants, &[text("pa_color", "blue")]);
        assert_eq!(Some(3), found.map(|v| v.id));
        assert_eq!(
            None,
            find_matching_variation(&variants, &[text("pa_color", "green")])
        );
        assert_eq!(
            Some(2),
            find_matching_variation(&variants, &[text("pa_size", "M")]).map(|v| v.id)
        );
        assert_eq!(
            Some(2),
            find_matching_variation(
                &variants,
                &[
                    ("pa_color".to_string(), AttributeValue::Composite),
                    text("pa_size", "M")
                ]
            )
            .map(|v| v.id)
        );
        assert_eq!(
            None,
            find_matching_variation(
                &variants,
                &[("pa_color".to_string(), AttributeValue::Other)]
            )
        );
    }

    #[test]
    fn rejects_files_in_gate_order() {
        assert!(matches!(parse_import_file("  "), Err(ImportError::NoData)));
        assert!(matches!(
            parse_import_file("not json"),
            Err(ImportError::InvalidFormat)
        ));
        assert!(matches!(
            parse_import_file("{}"),
            Err(ImportError::InvalidFormat)
        ));
        assert!(matches!(
            parse_import_file(r#"{"product_name":"Shirt"}"#),
            Err(ImportError::MissingFields)
        ));
        assert!(matches!(
            parse_import_file(r#"{"product_name":"Shirt","serialized":"x:1;"}"#),
            Err(ImportError::DecodeFailure(_))
        ));
        assert!(matches!(
            parse_import_file(r#"{"product_name":"Shirt","serialized":"b:0;"}"#),
            Err(ImportError::DecodeFailure(_))
        ));
        assert!(matches!(
            parse_import_file(r#"{"product_name":"Shirt","serialized":"i:5;"}"#),
            Err(ImportError::DecodeFailure(_))
        ));
    }

    #[test]
    fn reads_plain_json_history() {
        let file = parse_import_file(
            r#"{"product_name":"Mug","serialized":{"product":{"history":{"1700000000":"9.99","1700003600":8}}}}"#,
        )
        .unwrap();
        assert_eq!("Mug", file.product_name);
        assert_eq!(
            vec![
                PricePoint {
                    timestamp: 1_700_000_000,
                    price: dec!(9.99)
                },
                PricePoint {
                    timestamp: 1_700_003_600,
                    price: dec!(8)
                },
            ],
            file.blob.product_history
        );
        assert!(file.blob.variations.is_empty());
    }

    #[test]
    fn rejects_non_numeric_prices() {
        assert!(matches!(
            parse_import_file(
                r#"{"product_name":"Mug","serialized":{"product":{"history":{"1700000000":"cheap"}}}}"#
            ),
            Err(ImportError::DecodeFailure(_))
        ));
    }

    #[tokio::test]
    async fn imports_variation_history_into_matching_variant() {
        let importer = importer(shirt()).await;
        let summary = importer.import(1, SHIRT_FILE).await.unwrap();
        assert_eq!(1, summary.imported_count);
        assert_eq!(
            "Successfully imported 1 price history entries for product \"Product 1\"",
            summary.message
        );
        let written = importer.history.select(&ForEntity(3)).await.unwrap();
        assert_eq!(1, written.len());
        assert_eq!(dec!(12.5), written[0].price);
        assert!(importer.history.select(&ForEntity(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ignores_variations_for_simple_target() {
        let importer = importer(vec![entity(5, EntityKind::Simple, EntityStatus::Publish)]).await;
        let raw = r#"{"product_name":"Mug","serialized":"a:1:{s:7:\"product\";a:1:{s:7:\"history\";a:2:{i:1700000000;d:10;i:1700086400;d:9;}}}"}"#;
        let summary = importer.import(5, raw).await.unwrap();
        assert_eq!(2, summary.imported_count);
        assert_eq!(0, importer.import(5, SHIRT_FILE).await.unwrap().imported_count);
    }

    #[tokio::test]
    async fn unknown_target_is_reported_after_decoding() {
        let importer = importer(shirt()).await;
        assert!(matches!(
            importer.import(999, SHIRT_FILE).await,
            Err(ImportError::TargetNotFound(999))
        ));
        assert!(matches!(
            importer.import(999, "{]").await,
            Err(ImportError::InvalidFormat)
        ));
    }

    #[tokio::test]
    async fn exported_history_imports_back() {
        let importer = importer(shirt()).await;
        importer
            .history
            .add_historical_price(1, dec!(40), 1_700_000_000)
            .await
            .unwrap();
        importer
            .history
            .add_historical_price(3, dec!(12.50), 1_700_000_000)
            .await
            .unwrap();
        let file = importer.export_history(1).await.unwrap();
        assert_eq!("Product 1", file.product_name);

        let target = importer_with_same_catalog(&importer).await;
        let raw = serde_json::to_string(&file).unwrap();
        assert_eq!(2, target.import(1, &raw).await.unwrap().imported_count);
        let written = target.history.select(&ForEntity(3)).await.unwrap();
        assert_eq!(dec!(12.5), written[0].price);
    }

    async fn importer_with_same_catalog(importer: &Importer) -> Importer {
        Importer::new(importer.catalog.clone(), Arc::new(history().await))
    }
}
