#[macro_use]
extern crate lazy_static;

use std::sync::Arc;

use actix_identity::IdentityMiddleware;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{middleware, web::Data, App, HttpServer};
use log::info;
use sqlx::SqlitePool;

mod admin;
mod cart;
mod chat;
mod checkout;
mod config;
mod db;
mod errors;
mod notifications;
mod otp;
mod payment;
mod rentals;
mod routes;
mod structs;
#[cfg(test)]
mod testing;
mod utils;

use config::Config;
use otp::{HttpSmsSender, LogSmsSender, SmsSender};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<Config>,
    pub sms: Arc<dyn SmsSender>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("FATAL: {}", e);
            std::process::exit(1);
        }
    };

    let db_pool = db::connect(&config.database_url).await?;

    let sms: Arc<dyn SmsSender> = match &config.sms_gateway_url {
        Some(url) => Arc::new(HttpSmsSender::new(
            url.clone(),
            config.sms_gateway_token.clone(),
        )),
        None => {
            log::warn!("SMS_GATEWAY_URL not set, verification codes go to the log");
            Arc::new(LogSmsSender)
        }
    };

    let state = AppState {
        db_pool,
        config: Arc::new(config),
        sms,
    };
    db::seed_admin(&state).await?;

    let addr = state.config.server_addr();
    info!("Starting HTTP server on http://{}:{}/", addr.0, addr.1);

    HttpServer::new(move || {
        App::new()
            // enable automatic response compression - usually register this first
            .wrap(middleware::Compress::default())
            .wrap(IdentityMiddleware::default())
            .wrap(SessionMiddleware::new(
                CookieSessionStore::default(),
                state.config.cookie_key(),
            ))
            // enable logger - always register Actix Web Logger middleware last
            .wrap(middleware::Logger::default())
            .app_data(Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(addr)?
    .run()
    .await
}
