//! Checkout: customer details, phone verification, order hand-off.

use actix_session::Session;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    cart, db,
    errors::AppError,
    otp::{self, CodeCheck},
    utils::{is_valid_otp_code, normalize_phone, now_string},
    AppState,
};

pub const SESSION_KEY: &str = "checkout";
pub const PENDING_ORDER_KEY: &str = "pending_order";
pub const PAYMENT_PATH: &str = "/payment";
const MAX_NAME_LEN: usize = 100;
const MAX_INLINE_ERROR_LEN: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutState {
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub code_sent: bool,
    pub verified: bool,
    pub error: Option<String>,
}

impl CheckoutState {
    pub fn load(session: &Session) -> Result<CheckoutState, AppError> {
        session
            .get::<CheckoutState>(SESSION_KEY)
            .map(|state| state.unwrap_or_default())
            .map_err(|e| AppError::SessionError(e.to_string()))
    }

    pub fn save(&self, session: &Session) -> Result<(), AppError> {
        session
            .insert(SESSION_KEY, self)
            .map_err(|e| AppError::SessionError(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub price: Decimal,
    pub line_total: Decimal,
}

/// What the payment step receives. Nothing is persisted until payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub store_id: i64,
    pub customer: CustomerInfo,
    pub items: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub created_at: String,
}

/// Cookie form of the pending order: prices are frozen at submit, names and
/// totals are rebuilt on load.
#[derive(Debug, Serialize, Deserialize)]
struct StoredOrder {
    #[serde(rename = "s")]
    store_id: i64,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "p")]
    phone: String,
    #[serde(rename = "i")]
    items: Vec<(i64, i64, Decimal)>,
    #[serde(rename = "t")]
    created_at: String,
}

impl OrderPayload {
    pub fn save(&self, session: &Session) -> Result<(), AppError> {
        let stored = StoredOrder {
            store_id: self.store_id,
            name: self.customer.name.clone(),
            phone: self.customer.phone.clone(),
            items: self
                .items
                .iter()
                .map(|i| (i.product_id, i.quantity, i.price))
                .collect(),
            created_at: self.created_at.clone(),
        };
        session
            .insert(PENDING_ORDER_KEY, stored)
            .map_err(|e| AppError::SessionError(e.to_string()))
    }

    pub async fn load(
        state: &AppState,
        session: &Session,
    ) -> Result<Option<OrderPayload>, AppError> {
        let Some(stored) = session
            .get::<StoredOrder>(PENDING_ORDER_KEY)
            .map_err(|e| AppError::SessionError(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut items = Vec::with_capacity(stored.items.len());
        for (product_id, quantity, price) in stored.items {
            let name = match db::get_product_by_id(state, product_id).await {
                Ok(product) => product.name,
                Err(AppError::NotFound(_)) => format!("product #{}", product_id),
                Err(e) => return Err(e),
            };
            items.push(OrderLine {
                product_id,
                name,
                quantity,
                price,
                line_total: price * Decimal::from(quantity),
            });
        }
        let totals = cart::totals_for(items.iter().map(|i| i.line_total).sum());
        Ok(Some(OrderPayload {
            store_id: stored.store_id,
            customer: CustomerInfo {
                name: stored.name,
                phone: stored.phone,
            },
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            created_at: stored.created_at,
        }))
    }
}

/// Runs a checkout step and keeps its failure message in the checkout state.
pub async fn with_inline_error<T, F>(session: &Session, step: F) -> Result<T, AppError>
where
    F: std::future::Future<Output = Result<T, AppError>>,
{
    match step.await {
        Ok(value) => Ok(value),
        Err(err) => {
            let mut checkout = CheckoutState::load(session)?;
            checkout.error = Some(err.to_string().chars().take(MAX_INLINE_ERROR_LEN).collect());
            checkout.save(session)?;
            Err(err)
        }
    }
}

pub async fn send_code(
    state: &AppState,
    session: &Session,
    name: &str,
    phone: &str,
) -> Result<CheckoutState, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    let phone = normalize_phone(phone).ok_or_else(|| {
        AppError::Validation("Enter a valid mobile number, e.g. 05XXXXXXXX".to_string())
    })?;

    let mut checkout = CheckoutState::load(session)?;
    if checkout.phone.as_deref() != Some(phone.as_str()) {
        checkout.verified = false;
        checkout.code_sent = false;
    }
    checkout.customer_name = Some(name.to_string());
    checkout.phone = Some(phone.clone());
    checkout.save(session)?;

    otp::issue_code(state, &phone).await?;

    checkout.code_sent = true;
    checkout.verified = false;
    checkout.error = None;
    checkout.save(session)?;
    Ok(checkout)
}

pub async fn verify_code(
    state: &AppState,
    session: &Session,
    code: &str,
) -> Result<CheckoutState, AppError> {
    let mut checkout = CheckoutState::load(session)?;
    let phone = match (&checkout.phone, checkout.code_sent) {
        (Some(phone), true) => phone.clone(),
        _ => {
            return Err(AppError::Validation(
                "Request a verification code first".to_string(),
            ))
        }
    };
    let code = code.trim();
    if !is_valid_otp_code(code) {
        return Err(AppError::Validation("The code must be 6 digits".to_string()));
    }

    match otp::check_code(state, &phone, code).await? {
        CodeCheck::Valid => {
            checkout.verified = true;
            checkout.code_sent = false;
            checkout.error = None;
            checkout.save(session)?;
            Ok(checkout)
        }
        CodeCheck::Invalid { attempts_left } if attempts_left > 0 => Err(AppError::Validation(
            format!("Incorrect code, {} attempts left", attempts_left),
        )),
        CodeCheck::Invalid { .. } => {
            checkout.code_sent = false;
            checkout.save(session)?;
            Err(AppError::Validation(
                "Too many incorrect attempts; request a new code".to_string(),
            ))
        }
        CodeCheck::Expired | CodeCheck::Missing => {
            checkout.code_sent = false;
            checkout.save(session)?;
            Err(AppError::Validation(
                "The code has expired; request a new one".to_string(),
            ))
        }
    }
}

/// Validates the cart against live stock and hands the order payload to the
/// payment step through the session.
pub async fn submit(state: &AppState, session: &Session) -> Result<OrderPayload, AppError> {
    let checkout = CheckoutState::load(session)?;
    if !checkout.verified {
        return Err(AppError::VerificationRequired);
    }
    let (Some(name), Some(phone)) = (checkout.customer_name.clone(), checkout.phone.clone()) else {
        return Err(AppError::VerificationRequired);
    };

    let (cart, changed) = cart::load(state, session).await?;
    cart.save(session)?;
    if !changed.is_empty() {
        return Err(AppError::Conflict(format!(
            "Stock changed for: {}. Please review your cart",
            changed.join(", ")
        )));
    }
    let Some(store_id) = cart.store_id.filter(|_| !cart.is_empty()) else {
        return Err(AppError::Validation("Your cart is empty".to_string()));
    };

    let totals = cart.totals();
    let payload = OrderPayload {
        store_id,
        customer: CustomerInfo { name, phone },
        items: cart
            .lines
            .iter()
            .map(|line| OrderLine {
                product_id: line.product_id,
                name: line.name.clone(),
                quantity: line.quantity,
                price: line.price,
                line_total: line.line_total(),
            })
            .collect(),
        subtotal: totals.subtotal,
        tax: totals.tax,
        total: totals.total,
        created_at: now_string(),
    };

    payload.save(session)?;
    log::info!(
        "Checkout submitted for store {} ({} lines, total {})",
        store_id,
        payload.items.len(),
        payload.total
    );
    Ok(payload)
}
