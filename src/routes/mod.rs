use actix_identity::Identity;
use actix_web::{
    http::Method,
    web::{self, ServiceConfig},
    HttpResponse, Responder,
};
use serde::Serialize;
use serde_json::json;

use crate::{db, errors::AppError, structs::{Role, User}, AppState};

pub mod accounts;
pub mod admin;
pub mod catalog;
pub mod chat;
pub mod rentals;
pub mod storefront;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .service(accounts::register_handler)
    .service(accounts::login_handler)
    .service(accounts::logout_handler)
    .service(accounts::me_handler)
    .service(accounts::change_pwd_handler)
    .service(catalog::create_store_handler)
    .service(catalog::list_stores_handler)
    .service(catalog::create_shelf_handler)
    .service(catalog::list_shelves_handler)
    .service(catalog::available_shelves_handler)
    .service(catalog::set_shelf_status_handler)
    .service(catalog::create_product_handler)
    .service(catalog::list_products_handler)
    .service(catalog::update_stock_handler)
    .service(storefront::shop_handler)
    .service(storefront::view_cart_handler)
    .service(storefront::add_item_handler)
    .service(storefront::set_quantity_handler)
    .service(storefront::remove_item_handler)
    .service(storefront::clear_cart_handler)
    .service(storefront::checkout_state_handler)
    .service(storefront::send_code_handler)
    .service(storefront::verify_code_handler)
    .service(storefront::submit_handler)
    .service(storefront::pending_order_handler)
    .service(storefront::confirm_payment_handler)
    .service(storefront::cancel_payment_handler)
    .service(rentals::create_rental_handler)
    .service(rentals::list_rentals_handler)
    .service(rentals::get_rental_handler)
    .service(rentals::transition_handler)
    .service(rentals::advance_clearance_handler)
    .service(chat::list_conversations_handler)
    .service(chat::read_messages_handler)
    .service(chat::send_message_handler)
    .service(chat::list_notifications_handler)
    .service(chat::mark_read_handler)
    .service(chat::mark_all_read_handler)
    .service(admin::stats_handler)
    .service(admin::users_handler)
    .service(admin::shelves_handler)
    .service(admin::rentals_handler)
    .service(admin::orders_handler)
    .service(admin::settings_handler)
    .service(admin::update_setting_handler)
    .default_service(web::to(default_handler));
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

/// Resolves the logged-in user behind the identity cookie.
pub async fn current_user(state: &AppState, identity: Option<Identity>) -> Result<User, AppError> {
    let identity = identity.ok_or(AppError::Unauthorized)?;
    let id = identity
        .id()
        .map_err(|e| AppError::IdentityError(e.to_string()))?;
    let id: i64 = id.parse().map_err(|_| {
        log::warn!("Identity cookie holds a non-numeric id");
        AppError::Unauthorized
    })?;
    db::get_user_by_id(state, id)
        .await?
        .ok_or(AppError::Unauthorized)
}

pub async fn require_role(
    state: &AppState,
    identity: Option<Identity>,
    role: Role,
) -> Result<User, AppError> {
    let user = current_user(state, identity).await?;
    if user.role != role {
        return Err(AppError::Forbidden(format!(
            "This action requires the {} role",
            role.as_str()
        )));
    }
    Ok(user)
}

async fn default_handler(req_method: Method) -> impl Responder {
    match req_method {
        Method::GET => HttpResponse::NotFound()
            .json(json!({ "success": false, "error": "Not found" })),
        _ => HttpResponse::MethodNotAllowed().finish(),
    }
}
