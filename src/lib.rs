#![deny(clippy::unwrap_used)]
#![allow(clippy::from_over_into)]

use anyhow::Context;
use log_error::LogError;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use tokio_rusqlite::Connection;

pub mod access;
pub mod catalog;
pub mod control;
pub mod csv;
pub mod export;
pub mod history;
pub mod import;
pub mod php;

pub static SITE_URL: Lazy<String> = Lazy::new(|| envmnt::get_or("SITE_URL", "http://localhost"));

pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| envmnt::get_or("DATABASE_PATH", "storage/price_history.db"));

#[derive(Debug)]
pub struct SqlWrapper<T>(pub T);

impl<T> SqlWrapper<T> {
    pub fn from_sql<R>(r: R) -> Result<T, <Self as TryFrom<R>>::Error>
    where
        Self: TryFrom<R>,
    {
        r.try_into().map(|w: Self| w.0)
    }
}

/// Prices are stored as TEXT to keep them exact.
pub fn decimal_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    parse_decimal_column(idx, &row.get::<_, String>(idx)?)
}

pub fn parse_decimal_column(idx: usize, s: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str_exact(s).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

/// Loads `.env`, creating an empty one on first start.
pub fn load_env_file() -> Result<(), anyhow::Error> {
    match std::fs::File::open(".env") {
        Ok(_) => envmnt::load_file(".env")?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::File::create(".env")?;
            envmnt::load_file(".env")?;
        }
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to open .env file: {err}"));
        }
    }
    Ok(())
}

pub fn init_logger() {
    if let Err(std::env::VarError::NotPresent) = std::env::var("RUST_LOG") {
        std::env::set_var("RUST_LOG", "INFO");
    }
    pretty_env_logger::formatted_timed_builder()
        .parse_default_env()
        .init();
}

pub async fn open_connection(path: &str) -> Result<Connection, anyhow::Error> {
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Unable to create storage dir {}", dir.display()))?;
        }
    }
    let conn = Connection::open(path)
        .await
        .with_context(|| format!("Unable to open database {path}"))?;
    conn.call(|conn| {
        conn.pragma_update(None, "journal_mode", "WAL")
            .log_error("Unable to set journal_mode pragma");
        conn.pragma_update(None, "synchronous", "NORMAL")
            .log_error("Unable to set synchronous pragma");
        conn.pragma_update(None, "busy_timeout", 5000i64)
            .log_error("Unable to set busy_timeout pragma");
        Ok(())
    })
    .await?;
    Ok(conn)
}

#[cfg(test)]
pub mod test {

    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reads_exact_decimal_columns() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let (price, broken) = conn
            .query_row("SELECT '19.990', 'abc'", [], |row| {
                Ok((decimal_column(row, 0), decimal_column(row, 1)))
            })
            .unwrap();
        assert_eq!(dec!(19.990), price.unwrap());
        assert!(broken.is_err());
    }

    #[tokio::test]
    async fn opens_database_in_new_directory_with_wal() {
        let dir = std::env::temp_dir().join(format!("wcph-{}", rand::random::<u64>()));
        let path = dir.join("storage").join("price_history.db");
        let conn = open_connection(&path.to_string_lossy()).await.unwrap();
        let (journal_mode, busy_timeout) = conn
            .call(|conn| {
                Ok((
                    conn.query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))?,
                    conn.query_row("PRAGMA busy_timeout", [], |row| row.get::<_, i64>(0))?,
                ))
            })
            .await
            .unwrap();
        assert_eq!("wal", journal_mode.to_lowercase());
        assert_eq!(5000, busy_timeout);
        drop(conn);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
