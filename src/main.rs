use actix::prelude::*;
use actix_session::storage::CookieSessionStore;
use actix_session::SessionMiddleware;
use actix_web::cookie::Key;
use actix_web::middleware::{NormalizePath, TrailingSlash};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context as AnyhowContext;
use ph_types::access::service::UserCredentialsService;
use ph_types::catalog::CatalogRepository;
use ph_types::history::HistoryRepository;
use rand::{distributions, Rng};
use std::io::Write;
use std::sync::Arc;
use wcph_devtools::{
    access::repository::SqliteUserCredentialsRepository, catalog::SqliteCatalogRepository,
    control, export::Exporter, history::SqliteHistoryRepository, import::Importer,
    DATABASE_PATH, SITE_URL,
};

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    wcph_devtools::init_logger();
    wcph_devtools::load_env_file()?;

    let conn = wcph_devtools::open_connection(&DATABASE_PATH).await?;
    let catalog: Arc<dyn CatalogRepository> =
        Arc::new(SqliteCatalogRepository::init(conn.clone()).await?);
    let history: Arc<dyn HistoryRepository> =
        Arc::new(SqliteHistoryRepository::init(conn.clone()).await?);
    let users = Arc::new(SqliteUserCredentialsRepository::init(conn).await?);

    let admin_password = Some(envmnt::get_or("ADMIN_PASSWORD", "")).filter(|p| !p.is_empty());
    let user_service = UserCredentialsService::new(users, admin_password).start();
    let exporter = Arc::new(Exporter::new(
        catalog.clone(),
        history.clone(),
        SITE_URL.clone(),
    ));
    let importer = Arc::new(Importer::new(catalog.clone(), history));

    let secret_key: String = match envmnt::get_parse("SESSION_KEY") {
        Ok(v) => v,
        Err(envmnt::errors::EnvmntError::Missing(_)) => {
            let key = rand::thread_rng()
                .sample_iter(distributions::Alphanumeric)
                .take(64)
                .map(char::from)
                .collect::<String>();
            let mut f = std::fs::File::options().append(true).open(".env")?;
            f.write_all(format!("\nSESSION_KEY={key}\n").as_bytes())?;
            key
        }
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to read secret key: {err}"));
        }
    };
    let secret_key = Key::from(secret_key.as_bytes());
    let port: u16 = envmnt::get_parse("PORT").unwrap_or(8080);

    log::info!("Serving price history tools for {} on port {port}", *SITE_URL);
    HttpServer::new(move || {
        App::new()
            .wrap(control::SessionMiddlewareFactory {})
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_secure(false)
                    .build(),
            )
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .app_data(Data::new(user_service.clone()))
            .app_data(Data::new(exporter.clone()))
            .app_data(Data::new(importer.clone()))
            .app_data(Data::new(catalog.clone()))
            .configure(control::routes)
    })
    .bind(("0.0.0.0", port))
    .with_context(|| format!("Failed to bind server to 0.0.0.0:{port}"))?
    .run()
    .await?;
    Ok(())
}
