use actix_identity::Identity;
use actix_web::{get, post, put, web, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::{
    db,
    errors::AppError,
    routes::{current_user, ok, require_role},
    structs::{Role, ShelfStatus, Store, User},
    utils::parse_money,
    AppState,
};

async fn owned_store(state: &AppState, owner: &User, store_id: i64) -> Result<Store, AppError> {
    let store = db::get_store_by_id(state, store_id).await?;
    if store.owner_id != owner.id {
        return Err(AppError::Forbidden("Not your store".to_string()));
    }
    Ok(store)
}

#[derive(Deserialize)]
pub struct NewStore {
    name: String,
    city: String,
}

#[post("/stores")]
pub async fn create_store_handler(
    web::Json(form): web::Json<NewStore>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let owner = require_role(&state, identity, Role::StoreOwner).await?;
    if form.name.trim().is_empty() || form.city.trim().is_empty() {
        return Err(AppError::Validation("Store name and city are required".to_string()));
    }
    let store = db::create_store(
        &state,
        owner.id,
        form.name.trim().to_string(),
        form.city.trim().to_string(),
    )
    .await?;
    Ok(ok(store))
}

#[get("/stores")]
pub async fn list_stores_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let owner = require_role(&state, identity, Role::StoreOwner).await?;
    Ok(ok(db::get_stores_by_owner(&state, owner.id).await?))
}

#[derive(Deserialize)]
pub struct NewShelf {
    name: String,
    monthly_price: String,
}

#[post("/stores/{store_id}/shelves")]
pub async fn create_shelf_handler(
    path: web::Path<i64>,
    web::Json(form): web::Json<NewShelf>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let owner = require_role(&state, identity, Role::StoreOwner).await?;
    let store = owned_store(&state, &owner, path.into_inner()).await?;
    if form.name.trim().is_empty() {
        return Err(AppError::Validation("Shelf name is required".to_string()));
    }
    let price = parse_money(&form.monthly_price)?;
    let shelf = db::create_shelf(&state, store.id, form.name.trim().to_string(), price.to_string())
        .await?;
    let qr_path = shelf.qr_path();
    Ok(ok(json!({ "shelf": shelf, "qr_path": qr_path })))
}

#[get("/stores/{store_id}/shelves")]
pub async fn list_shelves_handler(
    path: web::Path<i64>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let owner = require_role(&state, identity, Role::StoreOwner).await?;
    let store = owned_store(&state, &owner, path.into_inner()).await?;
    Ok(ok(db::get_shelves_by_store(&state, store.id).await?))
}

#[get("/shelves/available")]
pub async fn available_shelves_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    current_user(&state, identity).await?;
    Ok(ok(db::get_available_shelves(&state).await?))
}

#[derive(Deserialize)]
pub struct ShelfStatusUpdate {
    status: ShelfStatus,
}

/// Puts a shelf into maintenance or back on the market.
#[put("/shelves/{shelf_id}/status")]
pub async fn set_shelf_status_handler(
    path: web::Path<i64>,
    web::Json(form): web::Json<ShelfStatusUpdate>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let owner = require_role(&state, identity, Role::StoreOwner).await?;
    let shelf = db::get_shelf_by_id(&state, path.into_inner()).await?;
    owned_store(&state, &owner, shelf.store_id).await?;
    if form.status == ShelfStatus::Rented {
        return Err(AppError::Validation(
            "Shelves become rented through a rental".to_string(),
        ));
    }
    db::set_shelf_status(&state, shelf.id, form.status).await?;
    Ok(ok(db::get_shelf_by_id(&state, shelf.id).await?))
}

#[derive(Deserialize)]
pub struct NewProduct {
    name: String,
    price: String,
    stock: i64,
}

#[post("/products")]
pub async fn create_product_handler(
    web::Json(form): web::Json<NewProduct>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let brand = require_role(&state, identity, Role::BrandOwner).await?;
    if form.name.trim().is_empty() {
        return Err(AppError::Validation("Product name is required".to_string()));
    }
    if form.stock < 0 {
        return Err(AppError::Validation("Stock cannot be negative".to_string()));
    }
    let price = parse_money(&form.price)?;
    let product = db::create_product(
        &state,
        brand.id,
        form.name.trim().to_string(),
        price.to_string(),
        form.stock,
    )
    .await?;
    Ok(ok(product))
}

#[get("/products")]
pub async fn list_products_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let brand = require_role(&state, identity, Role::BrandOwner).await?;
    Ok(ok(db::get_products_by_brand(&state, brand.id).await?))
}

#[derive(Deserialize)]
pub struct StockUpdate {
    stock: i64,
}

#[put("/products/{product_id}/stock")]
pub async fn update_stock_handler(
    path: web::Path<i64>,
    web::Json(form): web::Json<StockUpdate>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let brand = require_role(&state, identity, Role::BrandOwner).await?;
    let product = db::get_product_by_id(&state, path.into_inner()).await?;
    if product.brand_owner_id != brand.id {
        return Err(AppError::Forbidden("Not your product".to_string()));
    }
    db::update_product_stock(&state, product.id, form.stock).await?;
    Ok(ok(db::get_product_by_id(&state, product.id).await?))
}
