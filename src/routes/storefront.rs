//! Public shopper endpoints: shelf page, cart, checkout and payment.

use actix_session::Session;
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::{
    cart::{self, Cart},
    checkout::{self, CheckoutState, OrderPayload, PAYMENT_PATH},
    db,
    errors::AppError,
    payment,
    routes::ok,
    AppState,
};

fn cart_view(cart: &Cart, changed: &[String]) -> serde_json::Value {
    json!({
        "store_id": cart.store_id,
        "lines": cart.lines,
        "totals": cart.totals(),
        "changed": changed,
    })
}

/// Landing page behind a shelf's QR code.
#[get("/shop/{shelf_id}")]
pub async fn shop_handler(
    path: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let shelf = db::get_shelf_by_id(&state, path.into_inner()).await?;
    let store = db::get_store_by_id(&state, shelf.store_id).await?;
    let products = db::get_shelf_products(&state, shelf.id).await?;
    Ok(ok(json!({
        "store": { "id": store.id, "name": store.name, "city": store.city },
        "shelf": { "id": shelf.id, "name": shelf.name },
        "products": products
            .iter()
            .map(|p| json!({ "id": p.id, "name": p.name, "price": p.price, "stock": p.stock }))
            .collect::<Vec<_>>(),
    })))
}

#[get("/cart")]
pub async fn view_cart_handler(
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let (cart, changed) = cart::load(&state, &session).await?;
    cart.save(&session)?;
    Ok(ok(cart_view(&cart, &changed)))
}

#[derive(Deserialize)]
pub struct AddItem {
    product_id: i64,
    #[serde(default = "one")]
    quantity: i64,
}

fn one() -> i64 {
    1
}

#[post("/cart/items")]
pub async fn add_item_handler(
    web::Json(form): web::Json<AddItem>,
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let (mut cart, changed) = cart::load(&state, &session).await?;
    let kept = cart::add_item(&state, &mut cart, form.product_id, form.quantity).await?;
    cart.save(&session)?;
    Ok(ok(json!({ "quantity": kept, "cart": cart_view(&cart, &changed) })))
}

#[derive(Deserialize)]
pub struct SetQuantity {
    quantity: i64,
}

#[put("/cart/items/{product_id}")]
pub async fn set_quantity_handler(
    path: web::Path<i64>,
    web::Json(form): web::Json<SetQuantity>,
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let (mut cart, changed) = cart::load(&state, &session).await?;
    let kept = cart::set_quantity(&state, &mut cart, path.into_inner(), form.quantity).await?;
    cart.save(&session)?;
    Ok(ok(json!({ "quantity": kept, "cart": cart_view(&cart, &changed) })))
}

#[delete("/cart/items/{product_id}")]
pub async fn remove_item_handler(
    path: web::Path<i64>,
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let (mut cart, changed) = cart::load(&state, &session).await?;
    cart::remove_item(&mut cart, path.into_inner());
    cart.save(&session)?;
    Ok(ok(cart_view(&cart, &changed)))
}

#[delete("/cart")]
pub async fn clear_cart_handler(session: Session) -> Result<impl Responder, AppError> {
    session.remove(cart::SESSION_KEY);
    Ok(ok(cart_view(&Cart::default(), &[])))
}

#[get("/checkout")]
pub async fn checkout_state_handler(
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let checkout = CheckoutState::load(&session)?;
    let (cart, changed) = cart::load(&state, &session).await?;
    Ok(ok(json!({ "checkout": checkout, "cart": cart_view(&cart, &changed) })))
}

#[derive(Deserialize)]
pub struct SendCode {
    name: String,
    phone: String,
}

#[post("/checkout/send-code")]
pub async fn send_code_handler(
    web::Json(form): web::Json<SendCode>,
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let checkout = checkout::with_inline_error(
        &session,
        checkout::send_code(&state, &session, &form.name, &form.phone),
    )
    .await?;
    Ok(ok(checkout))
}

#[derive(Deserialize)]
pub struct VerifyCode {
    code: String,
}

#[post("/checkout/verify")]
pub async fn verify_code_handler(
    web::Json(form): web::Json<VerifyCode>,
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let checkout = checkout::with_inline_error(
        &session,
        checkout::verify_code(&state, &session, &form.code),
    )
    .await?;
    Ok(ok(checkout))
}

/// Hands the order to the payment step and redirects there.
#[post("/checkout/submit")]
pub async fn submit_handler(
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let payload =
        checkout::with_inline_error(&session, checkout::submit(&state, &session)).await?;
    Ok(HttpResponse::SeeOther()
        .append_header(("Location", PAYMENT_PATH))
        .json(json!({ "success": true, "data": payload })))
}

#[get("/payment")]
pub async fn pending_order_handler(
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let payload = OrderPayload::load(&state, &session)
        .await?
        .ok_or_else(|| AppError::NotFound("No pending order".to_string()))?;
    Ok(ok(payload))
}

#[derive(Deserialize)]
pub struct ConfirmPayment {
    payment_method: String,
}

#[post("/payment/confirm")]
pub async fn confirm_payment_handler(
    web::Json(form): web::Json<ConfirmPayment>,
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let order = payment::confirm(&state, &session, &form.payment_method).await?;
    Ok(ok(order))
}

#[post("/payment/cancel")]
pub async fn cancel_payment_handler(
    state: web::Data<AppState>,
    session: Session,
) -> Result<impl Responder, AppError> {
    let cart = payment::abandon(&state, &session).await?;
    Ok(ok(cart_view(&cart, &[])))
}
