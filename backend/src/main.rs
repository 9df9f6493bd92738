mod config;
mod error;
mod feed;
mod services;
mod storage;
mod store;

use actix_files::Files;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{error, info};
use std::io;
use std::sync::Arc;

use crate::config::Config;
use crate::feed::ChangeFeed;
use crate::services::ocr::OcrClient;
use crate::storage::{BlobStore, LocalBlobStore, FILES_MOUNT};
use crate::store::Store;

fn startup_error(what: &str, e: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", what, e);
    io::Error::other(format!("{}: {}", what, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    let store = Store::open(&config.database_path)
        .map_err(|e| startup_error("Could not open the record store", e))?;
    let local_blobs = LocalBlobStore::new(&config.storage_dir, &config.public_url)
        .map_err(|e| startup_error("Could not prepare blob storage", e))?;
    info!("Serving stored photos from {}", local_blobs.root().display());
    let blobs: Arc<dyn BlobStore> = Arc::new(local_blobs);
    let ocr = OcrClient::new(config.ocr_url.clone(), config.ocr_timeout)
        .map_err(|e| startup_error("Could not build the OCR client", e))?;
    let feed = ChangeFeed::default();

    let store = web::Data::new(store);
    let blobs = web::Data::from(blobs);
    let ocr = web::Data::new(ocr);
    let feed = web::Data::new(feed);
    let storage_dir = config.storage_dir.clone();
    let json_limit = config.json_limit;

    info!("Server running at {}", config.address());

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(services::cors::default_headers())
            .app_data(services::json_config(json_limit))
            .app_data(services::query_config())
            .app_data(store.clone())
            .app_data(blobs.clone())
            .app_data(ocr.clone())
            .app_data(feed.clone())
            .configure(services::configure)
            .service(Files::new(FILES_MOUNT, &storage_dir))
            .default_service(web::to(services::cors::fallback))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
