//! Turns the pending order payload into a persisted order.

use actix_session::Session;

use crate::{
    cart::{self, Cart},
    checkout::{self, CheckoutState, OrderPayload},
    errors::AppError,
    structs::Order,
    utils::now_string,
    AppState,
};

/// Re-checks stock, decrements it and writes the order in one transaction,
/// then clears the cart and checkout state from the session.
pub async fn confirm(
    state: &AppState,
    session: &Session,
    payment_method: &str,
) -> Result<Order, AppError> {
    let payment_method = payment_method.trim();
    if payment_method.is_empty() {
        return Err(AppError::Validation("Choose a payment method".to_string()));
    }
    let payload = OrderPayload::load(state, session)
        .await?
        .ok_or_else(|| AppError::NotFound("No pending order".to_string()))?;

    let mut tx = state.db_pool.begin().await?;

    for item in &payload.items {
        // the stock guard in the WHERE clause makes the decrement all-or-nothing
        let result = sqlx::query(
            "UPDATE products SET stock = stock - $1, updated_at = $2 \
             WHERE id = $3 AND stock >= $1",
        )
        .bind(item.quantity)
        .bind(now_string())
        .bind(item.product_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            log::warn!(
                "Payment aborted: product {} no longer has {} in stock",
                item.product_id,
                item.quantity
            );
            return Err(AppError::Conflict(format!(
                "{} is no longer available in the requested quantity",
                item.name
            )));
        }
    }

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (store_id, customer_name, customer_phone, subtotal, tax, total, \
         payment_method, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(payload.store_id)
    .bind(&payload.customer.name)
    .bind(&payload.customer.phone)
    .bind(payload.subtotal.to_string())
    .bind(payload.tax.to_string())
    .bind(payload.total.to_string())
    .bind(payment_method)
    .bind(now_string())
    .fetch_one(&mut *tx)
    .await?;

    for item in &payload.items {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, name, price, quantity) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order.id)
        .bind(item.product_id)
        .bind(&item.name)
        .bind(item.price.to_string())
        .bind(item.quantity)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    session.remove(cart::SESSION_KEY);
    session.remove(checkout::SESSION_KEY);
    session.remove(checkout::PENDING_ORDER_KEY);

    log::info!(
        "Order {} created for store {} (total {})",
        order.id,
        order.store_id,
        order.total
    );
    Ok(order)
}

/// Drops the pending order and sends the shopper back to the cart.
pub async fn abandon(state: &AppState, session: &Session) -> Result<Cart, AppError> {
    session.remove(checkout::PENDING_ORDER_KEY);
    let mut checkout = CheckoutState::load(session)?;
    checkout.error = None;
    checkout.save(session)?;
    let (cart, _) = cart::load(state, session).await?;
    cart.save(session)?;
    Ok(cart)
}
