use anyhow::Context as AnyhowContext;
use async_trait::async_trait;
use itertools::Itertools;
use ph_types::catalog::{CatalogRepository, EntityId};
use ph_types::history::HistoryRepository;
use ph_types::record::ProductRecord;
use ph_types::{EntityStatus, LOWEST_PRICE_WINDOW_DAYS};
use std::sync::Arc;
use time::macros::format_description;
use time::OffsetDateTime;
use typesafe_repository::async_ops::Get;

pub mod controllers;

/// Produces export rows for a chunk of IDs.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch_details(&self, ids: &[EntityId]) -> Result<Vec<ProductRecord>, anyhow::Error>;
}

pub struct Exporter {
    catalog: Arc<dyn CatalogRepository>,
    history: Arc<dyn HistoryRepository>,
    site_url: String,
}

impl Exporter {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        history: Arc<dyn HistoryRepository>,
        site_url: String,
    ) -> Self {
        Self {
            catalog,
            history,
            site_url,
        }
    }

    /// Every product, then every variation, in any exportable status.
    pub async fn collect_ids(&self) -> Result<Vec<EntityId>, anyhow::Error> {
        let products = self
            .catalog
            .product_ids(&EntityStatus::EXPORTABLE)
            .await
            .context("Unable to list product ids")?;
        let variations = self
            .catalog
            .variation_ids(&EntityStatus::EXPORTABLE)
            .await
            .context("Unable to list variation ids")?;
        Ok(products.into_iter().chain(variations).unique().collect())
    }
}

#[async_trait]
impl DetailSource for Exporter {
    /// IDs that don't resolve are skipped.
    async fn fetch_details(&self, ids: &[EntityId]) -> Result<Vec<ProductRecord>, anyhow::Error> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(entity) = self.catalog.resolve(id).await? else {
                log::debug!("Skipping entity {id}: not found");
                continue;
            };
            let parent = match entity.parent_id {
                Some(parent) if entity.is_variation() => self.catalog.get_one(&parent).await?,
                _ => None,
            };
            let lowest_price = self
                .history
                .get_minimal(entity.id, LOWEST_PRICE_WINDOW_DAYS)
                .await
                .with_context(|| format!("Unable to read price history of {id}"))?;
            records.push(ProductRecord {
                id: entity.id,
                permalink: entity.permalink(&self.site_url, parent.as_ref()),
                current_price: entity.live_price(),
                title: entity.name,
                lowest_price,
            });
        }
        Ok(records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Runs detail fetches over an ID list in fixed-size chunks.
pub struct ExportJob<'a, S: ?Sized> {
    source: &'a S,
    chunk_size: usize,
}

impl<'a, S: DetailSource + ?Sized> ExportJob<'a, S> {
    pub fn new(source: &'a S, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Progress is reported before each chunk is requested, an empty chunk
    /// ends the run. The first failing chunk aborts the whole export.
    pub async fn run(
        &self,
        ids: &[EntityId],
        mut on_progress: impl FnMut(Progress),
    ) -> Result<Vec<ProductRecord>, anyhow::Error> {
        let total = ids.len();
        let mut records = Vec::with_capacity(total);
        let mut index = 0;
        loop {
            on_progress(Progress {
                processed: index.min(total),
                total,
            });
            let chunk = &ids[index.min(total)..index.saturating_add(self.chunk_size).min(total)];
            if chunk.is_empty() {
                break;
            }
            let mut fetched = self
                .source
                .fetch_details(chunk)
                .await
                .with_context(|| format!("Export failed at offset {index} of {total}"))?;
            records.append(&mut fetched);
            index = index.saturating_add(self.chunk_size);
        }
        Ok(records)
    }
}

/// `price-history-export-YYYY-MM-DD-HH-MM-SS.csv`
pub fn export_filename(at: OffsetDateTime) -> Result<String, anyhow::Error> {
    let stamp = at.format(format_description!(
        "[year]-[month]-[day]-[hour]-[minute]-[second]"
    ))?;
    Ok(format!("price-history-export-{stamp}.csv"))
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::catalog::test::{entity, repository as catalog, variation};
    use crate::history::test::repository as history;
    use ph_types::catalog::Entity;
    use ph_types::EntityKind;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use time::macros::datetime;

    async fn exporter(entities: Vec<Entity>) -> Exporter {
        Exporter::new(
            Arc::new(catalog(entities).await),
            Arc::new(history().await),
            "https://shop.test".to_string(),
        )
    }

    fn catalog_entities() -> Vec<Entity> {
        let mut entities = vec![
            entity(1, EntityKind::Variable, EntityStatus::Publish),
            variation(2, 1, &[("pa_color", "red")]),
            entity(3, EntityKind::Simple, EntityStatus::Draft),
            entity(4, EntityKind::Simple, EntityStatus::Trash),
        ];
        entities[1].name = "Product 1 - Red".to_string();
        entities.extend((10..33).map(|id| entity(id, EntityKind::Simple, EntityStatus::Publish)));
        entities
    }

    #[tokio::test]
    async fn collects_products_before_variations() {
        let exporter = exporter(catalog_entities()).await;
        let ids = exporter.collect_ids().await.unwrap();
        assert_eq!(vec![1, 3], ids[..2].to_vec());
        assert_eq!(Some(&2), ids.last());
        assert!(!ids.contains(&4));
        assert_eq!(ids.len(), ids.iter().unique().count());
    }

    #[tokio::test]
    async fn fetches_details_and_skips_unknown_ids() {
        let exporter = exporter(catalog_entities()).await;
        exporter
            .history
            .add_historical_price(2, dec!(7.5), OffsetDateTime::now_utc().unix_timestamp() - 60)
            .await
            .unwrap();
        let records = exporter.fetch_details(&[2, 999, 4]).await.unwrap();
        assert_eq!(
            vec![ProductRecord {
                id: 2,
                title: "Product 1 - Red".to_string(),
                permalink: "https://shop.test/product/product-1/?attribute_pa_color=red"
                    .to_string(),
                current_price: dec!(10),
                lowest_price: dec!(7.5),
            }],
            records
        );
    }

    #[tokio::test]
    async fn chunked_run_matches_single_fetch() {
        let exporter = exporter(catalog_entities()).await;
        let ids = exporter.collect_ids().await.unwrap();
        let expected = exporter.fetch_details(&ids).await.unwrap();
        for chunk_size in 1..=ids.len() + 1 {
            let mut reports = Vec::new();
            let chunked = ExportJob::new(&exporter, chunk_size)
                .run(&ids, |p| reports.push(p))
                .await
                .unwrap();
            assert_eq!(expected, chunked, "chunk size {chunk_size}");
            assert_eq!(
                ids.len().div_ceil(chunk_size) + 1,
                reports.len(),
                "chunk size {chunk_size}"
            );
            assert!(reports.windows(2).all(|w| w[0].processed < w[1].processed));
            assert_eq!(Some(1.0), reports.last().map(Progress::fraction));
        }
    }

    #[tokio::test]
    async fn reports_chunk_boundaries() {
        let exporter = exporter(catalog_entities()).await;
        let ids = exporter.collect_ids().await.unwrap();
        let mut reports = Vec::new();
        ExportJob::new(&exporter, 10)
            .run(&ids, |p| reports.push(p))
            .await
            .unwrap();
        assert_eq!(
            vec![0, 10, 20, 26],
            reports.iter().map(|p| p.processed).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn huge_chunk_size_runs_in_one_chunk() {
        let exporter = exporter(catalog_entities()).await;
        let ids = exporter.collect_ids().await.unwrap();
        let mut reports = Vec::new();
        let records = ExportJob::new(&exporter, usize::MAX)
            .run(&ids, |p| reports.push(p))
            .await
            .unwrap();
        assert_eq!(exporter.fetch_details(&ids).await.unwrap(), records);
        assert_eq!(
            vec![
                Progress {
                    processed: 0,
                    total: ids.len()
                },
                Progress {
                    processed: ids.len(),
                    total: ids.len()
                },
            ],
            reports
        );
    }

    #[tokio::test]
    async fn empty_id_list_finishes_at_full_progress() {
        let exporter = exporter(vec![]).await;
        let mut reports = Vec::new();
        let records = ExportJob::new(&exporter, 10)
            .run(&[], |p| reports.push(p))
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(vec![Progress { processed: 0, total: 0 }], reports);
        assert_eq!(1.0, reports[0].fraction());
    }

    struct FailingSource {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl DetailSource for FailingSource {
        async fn fetch_details(
            &self,
            ids: &[EntityId],
        ) -> Result<Vec<ProductRecord>, anyhow::Error> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 2 {
                anyhow::bail!("connection reset");
            }
            Ok(ids
                .iter()
                .map(|id| ProductRecord {
                    id: *id,
                    title: String::new(),
                    permalink: String::new(),
                    current_price: dec!(1),
                    lowest_price: dec!(1),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn failing_chunk_aborts_export() {
        let source = FailingSource {
            calls: Mutex::new(0),
        };
        let ids = (1..=25).collect::<Vec<_>>();
        let result = ExportJob::new(&source, 10).run(&ids, |_| ()).await;
        assert!(result.is_err());
        assert_eq!(2, *source.calls.lock().unwrap());
    }

    #[test]
    fn names_export_file_after_timestamp() {
        assert_eq!(
            "price-history-export-2024-03-05-07-08-09.csv",
            export_filename(datetime!(2024-03-05 07:08:09 UTC)).unwrap()
        );
    }
}
