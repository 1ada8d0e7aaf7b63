mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod utils;

use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use log::info;
use std::io;

use crate::config::Config;
use crate::db::JsonStore;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;

    let store = JsonStore::open(&config.db_path)
        .await
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;

    info!(
        "Storing employees in {} and uploads in {}",
        config.db_path.display(),
        config.upload.upload_dir.display()
    );
    info!("Starting server at {}", config.bind_address);

    let bind_address = config.bind_address.clone();
    let store = web::Data::new(store);
    let config = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(handlers::cors())
            .wrap(Logger::default())
            .app_data(store.clone())
            .app_data(config.clone())
            .configure(handlers::configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
