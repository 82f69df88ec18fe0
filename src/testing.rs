//! Shared fixtures for unit and HTTP tests.

use std::sync::{Arc, Mutex};

use actix_web::{cookie::Cookie, dev::ServiceResponse};
use async_trait::async_trait;

use crate::{
    config::Config,
    db,
    errors::AppError,
    otp::SmsSender,
    structs::{Product, Role, Shelf, ShelfStatus, Store, User},
    utils::{hash_password, now_string},
    AppState,
};

pub const SEED_PASSWORD: &str = "shelf-space-2025!";

lazy_static! {
    static ref SEED_HASH: String = hash_password(SEED_PASSWORD).unwrap();
}

/// Keeps every message so tests can read the code back.
#[derive(Default)]
pub struct RecordingSmsSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSmsSender {
    pub fn last_code(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        sent.last()
            .and_then(|(_, msg)| msg.rsplit(' ').next().map(str::to_string))
    }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send(&self, phone: &str, message: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

pub async fn test_state() -> (AppState, Arc<RecordingSmsSender>) {
    let config = Config::for_tests();
    let db_pool = db::connect(&config.database_url).await.unwrap();
    let sms = Arc::new(RecordingSmsSender::default());
    let state = AppState {
        db_pool,
        config: Arc::new(config),
        sms: sms.clone(),
    };
    (state, sms)
}

pub struct Marketplace {
    pub admin: User,
    pub store_owner: User,
    pub brand: User,
    pub store: Store,
    pub free_shelf: Shelf,
    pub rented_shelf: Shelf,
    /// On `rented_shelf`, price 25.00, stock 3.
    pub scarce_product: Product,
    /// On `rented_shelf`, price 4.35, stock 10.
    pub plenty_product: Product,
    pub unplaced_product: Product,
    /// A second branch of the same owner, with one stocked product on display.
    pub other_store: Store,
    pub other_product: Product,
}

async fn seed_user(state: &AppState, email: &str, role: Role, name: &str) -> User {
    let now = now_string();
    sqlx::query_as::<_, User>(
        "INSERT INTO users (email, pwd_hash, role, display_name, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $5) RETURNING *",
    )
    .bind(email)
    .bind(SEED_HASH.as_str())
    .bind(role)
    .bind(name)
    .bind(&now)
    .fetch_one(&state.db_pool)
    .await
    .unwrap()
}

async fn place(state: &AppState, product: Product, shelf: &Shelf) -> Product {
    sqlx::query("UPDATE products SET shelf_id = $1 WHERE id = $2")
        .bind(shelf.id)
        .bind(product.id)
        .execute(&state.db_pool)
        .await
        .unwrap();
    db::get_product_by_id(state, product.id).await.unwrap()
}

pub async fn seed_marketplace(state: &AppState) -> Marketplace {
    let admin = seed_user(state, "admin@shibr.test", Role::Admin, "Admin").await;
    let store_owner =
        seed_user(state, "owner@corner.test", Role::StoreOwner, "Corner Market").await;
    let brand = seed_user(state, "hello@dates.test", Role::BrandOwner, "Qassim Dates").await;

    let store = db::create_store(state, store_owner.id, "Corner Market".into(), "Riyadh".into())
        .await
        .unwrap();
    let free_shelf = db::create_shelf(state, store.id, "Entrance A1".into(), "450.00".into())
        .await
        .unwrap();
    let rented_shelf = db::create_shelf(state, store.id, "Checkout B2".into(), "600.00".into())
        .await
        .unwrap();
    db::set_shelf_status(state, rented_shelf.id, ShelfStatus::Rented)
        .await
        .unwrap();
    let rented_shelf = db::get_shelf_by_id(state, rented_shelf.id).await.unwrap();

    let scarce = db::create_product(state, brand.id, "Sukkari Box".into(), "25.00".into(), 3)
        .await
        .unwrap();
    let plenty = db::create_product(state, brand.id, "Date Bar".into(), "4.35".into(), 10)
        .await
        .unwrap();
    let unplaced_product =
        db::create_product(state, brand.id, "Ajwa Tin".into(), "60.00".into(), 20)
            .await
            .unwrap();

    let other_store = db::create_store(state, store_owner.id, "Corner Market".into(), "Jeddah".into())
        .await
        .unwrap();
    let other_shelf = db::create_shelf(state, other_store.id, "Counter J1".into(), "300.00".into())
        .await
        .unwrap();
    db::set_shelf_status(state, other_shelf.id, ShelfStatus::Rented)
        .await
        .unwrap();
    let other = db::create_product(state, brand.id, "Khalas Pack".into(), "18.00".into(), 6)
        .await
        .unwrap();

    Marketplace {
        scarce_product: place(state, scarce, &rented_shelf).await,
        plenty_product: place(state, plenty, &rented_shelf).await,
        unplaced_product,
        other_product: place(state, other, &other_shelf).await,
        other_store,
        admin,
        store_owner,
        brand,
        store,
        free_shelf,
        rented_shelf,
    }
}

/// Session and identity share one cookie; keep the newest one around.
pub fn carry_cookie<B>(resp: &ServiceResponse<B>, jar: &mut Option<Cookie<'static>>) {
    if let Some(cookie) = resp.response().cookies().find(|c| c.name() == "id") {
        *jar = Some(cookie.into_owned());
    }
}

/// Builds the full app around `state` for `actix_web::test` calls.
#[macro_export]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(actix_identity::IdentityMiddleware::default())
                .wrap(actix_session::SessionMiddleware::new(
                    actix_session::storage::CookieSessionStore::default(),
                    $state.config.cookie_key(),
                ))
                .app_data(actix_web::web::Data::new($state.clone()))
                .configure($crate::routes::configure),
        )
        .await
    };
}
