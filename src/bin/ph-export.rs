//! Full export to a CSV file without going through the HTTP API.
//!
//! Usage: `ph-export [output.csv]`

use anyhow::Context as AnyhowContext;
use indicatif::{ProgressBar, ProgressStyle};
use log_error::LogError;
use ph_types::DEFAULT_CHUNK_SIZE;
use std::sync::Arc;
use time::OffsetDateTime;
use wcph_devtools::{
    catalog::SqliteCatalogRepository,
    export::{export_filename, ExportJob, Exporter},
    history::SqliteHistoryRepository,
    DATABASE_PATH, SITE_URL,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    wcph_devtools::init_logger();
    if std::path::Path::new(".env").exists() {
        envmnt::load_file(".env")?;
    }

    let output = match std::env::args().nth(1) {
        Some(path) => path,
        None => export_filename(OffsetDateTime::now_utc())?,
    };
    let chunk_size: usize = envmnt::get_parse("EXPORT_CHUNK_SIZE").unwrap_or(DEFAULT_CHUNK_SIZE);

    let conn = wcph_devtools::open_connection(&DATABASE_PATH).await?;
    let exporter = Exporter::new(
        Arc::new(SqliteCatalogRepository::init(conn.clone()).await?),
        Arc::new(SqliteHistoryRepository::init(conn).await?),
        SITE_URL.clone(),
    );

    let ids = exporter.collect_ids().await?;
    log::info!("Exporting {} products and variations", ids.len());
    let pb = ProgressBar::new(ids.len() as u64);
    if let Some(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos:>7}/{len:7} {msg}")
        .log_error("Unable to initialize progress bar")
    {
        pb.set_style(style.progress_chars("=-"));
    }
    let records = ExportJob::new(&exporter, chunk_size)
        .run(&ids, |p| pb.set_position(p.processed as u64))
        .await?;
    pb.finish_and_clear();

    let body = wcph_devtools::csv::write_records(&records)?;
    tokio::fs::write(&output, body)
        .await
        .with_context(|| format!("Unable to write {output}"))?;
    log::info!("Exported {} records to {output}", records.len());
    Ok(())
}
