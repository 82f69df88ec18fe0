//! Per-visitor shopping cart kept in the cookie session.
//!
//! The cookie only holds product ids and quantities. Names, prices and
//! `max_quantity` are re-read from the product rows whenever the cart is
//! loaded, so they always reflect live stock and the live price.

use actix_session::Session;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{db, errors::AppError, structs::Product, AppState};

pub const SESSION_KEY: &str = "cart";
/// Keeps the session cookie well under the browser's 4 KB limit.
pub const MAX_CART_LINES: usize = 40;

lazy_static! {
    /// Fixed VAT rate applied at checkout.
    pub static ref TAX_RATE: Decimal = Decimal::new(15, 2);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub price: Decimal,
    pub max_quantity: i64,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    pub store_id: Option<i64>,
    pub lines: Vec<CartLine>,
}

/// Cookie form of the cart.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCart {
    #[serde(rename = "s")]
    store_id: Option<i64>,
    #[serde(rename = "l")]
    lines: Vec<(i64, i64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Two decimal places, midpoint away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn totals_for(subtotal: Decimal) -> CartTotals {
    CartTotals {
        subtotal: round_money(subtotal),
        tax: round_money(subtotal * *TAX_RATE),
        total: round_money(subtotal * (Decimal::ONE + *TAX_RATE)),
    }
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, product_id: i64) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    pub fn quantity_of(&self, product_id: i64) -> i64 {
        self.line(product_id).map(|l| l.quantity).unwrap_or(0)
    }

    /// Sets the quantity for `product`, clamped to `[0, stock]`. A result of 0
    /// drops the line. Returns the quantity actually kept.
    pub fn set_line(&mut self, product: &Product, price: Decimal, quantity: i64) -> i64 {
        let max_quantity = product.stock.max(0);
        let quantity = quantity.clamp(0, max_quantity);

        if quantity == 0 {
            self.lines.retain(|l| l.product_id != product.id);
        } else if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            line.quantity = quantity;
            line.max_quantity = max_quantity;
            line.price = price;
            line.name = product.name.clone();
        } else {
            self.lines.push(CartLine {
                product_id: product.id,
                name: product.name.clone(),
                quantity,
                price,
                max_quantity,
            });
        }

        if self.lines.is_empty() {
            self.store_id = None;
        }
        quantity
    }

    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn totals(&self) -> CartTotals {
        totals_for(self.subtotal())
    }

    pub fn save(&self, session: &Session) -> Result<(), AppError> {
        let stored = StoredCart {
            store_id: self.store_id,
            lines: self
                .lines
                .iter()
                .map(|l| (l.product_id, l.quantity))
                .collect(),
        };
        session
            .insert(SESSION_KEY, stored)
            .map_err(|e| AppError::SessionError(e.to_string()))
    }
}

/// Reads the cart from the session and refreshes every line from its product
/// row. Also returns the names of lines that had to be lowered or dropped.
pub async fn load(state: &AppState, session: &Session) -> Result<(Cart, Vec<String>), AppError> {
    let stored = session
        .get::<StoredCart>(SESSION_KEY)
        .map_err(|e| AppError::SessionError(e.to_string()))?
        .unwrap_or_default();
    let mut cart = Cart {
        store_id: stored.store_id,
        lines: stored
            .lines
            .into_iter()
            .map(|(product_id, quantity)| CartLine {
                product_id,
                name: String::new(),
                quantity,
                price: Decimal::ZERO,
                max_quantity: quantity,
            })
            .collect(),
    };
    let changed = revalidate(state, &mut cart).await?;
    Ok((cart, changed))
}

async fn live_product(
    state: &AppState,
    cart: &Cart,
    product_id: i64,
) -> Result<(Product, Decimal), AppError> {
    let product = db::get_product_by_id(state, product_id).await?;
    let Some(store_id) = product.store_id else {
        return Err(AppError::Validation(format!(
            "{} is not on sale in any store",
            product.name
        )));
    };
    if let Some(cart_store) = cart.store_id {
        if cart_store != store_id {
            return Err(AppError::Conflict(
                "Your cart holds products from another store; clear it first".to_string(),
            ));
        }
    }
    let price = crate::utils::parse_money(&product.price)?;
    Ok((product, price))
}

/// Adds `quantity` units on top of what the cart already holds.
pub async fn add_item(
    state: &AppState,
    cart: &mut Cart,
    product_id: i64,
    quantity: i64,
) -> Result<i64, AppError> {
    if quantity < 1 {
        return Err(AppError::Validation("Quantity must be at least 1".to_string()));
    }
    if cart.line(product_id).is_none() && cart.lines.len() >= MAX_CART_LINES {
        return Err(AppError::Validation(format!(
            "A cart holds at most {} different products",
            MAX_CART_LINES
        )));
    }
    let (product, price) = live_product(state, cart, product_id).await?;
    if product.stock <= 0 {
        return Err(AppError::Conflict(format!("{} is out of stock", product.name)));
    }
    let wanted = cart.quantity_of(product_id).saturating_add(quantity);
    if cart.store_id.is_none() {
        cart.store_id = product.store_id;
    }
    let kept = cart.set_line(&product, price, wanted);
    if kept < wanted {
        log::debug!(
            "Clamped product {} from {} to {} (stock {})",
            product_id,
            wanted,
            kept,
            product.stock
        );
    }
    Ok(kept)
}

pub async fn set_quantity(
    state: &AppState,
    cart: &mut Cart,
    product_id: i64,
    quantity: i64,
) -> Result<i64, AppError> {
    if cart.line(product_id).is_none() {
        return Err(AppError::NotFound(format!("Product {} is not in the cart", product_id)));
    }
    let (product, price) = live_product(state, cart, product_id).await?;
    Ok(cart.set_line(&product, price, quantity))
}

pub fn remove_item(cart: &mut Cart, product_id: i64) {
    cart.lines.retain(|l| l.product_id != product_id);
    if cart.lines.is_empty() {
        cart.store_id = None;
    }
}

/// Re-reads every line against live stock. Returns the product names whose
/// quantity had to be lowered or dropped.
pub async fn revalidate(state: &AppState, cart: &mut Cart) -> Result<Vec<String>, AppError> {
    let mut changed = Vec::new();
    let snapshot = cart.lines.clone();
    for line in snapshot {
        let product = match db::get_product_by_id(state, line.product_id).await {
            Ok(product) => product,
            Err(AppError::NotFound(_)) => {
                remove_item(cart, line.product_id);
                changed.push(format!("product #{}", line.product_id));
                continue;
            }
            Err(e) => return Err(e),
        };
        if product.store_id.is_none() || product.store_id != cart.store_id {
            remove_item(cart, line.product_id);
            changed.push(product.name);
            continue;
        }
        let price = crate::utils::parse_money(&product.price)?;
        let kept = cart.set_line(&product, price, line.quantity);
        if kept != line.quantity {
            changed.push(product.name);
        }
    }
    Ok(changed)
}
