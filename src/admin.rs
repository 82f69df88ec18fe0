//! Read-mostly aggregations for the admin dashboard.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    errors::AppError,
    structs::{Order, RentalRequest, Shelf, User},
    utils::parse_money,
    AppState,
};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageQuery {
    /// Page is 1-based; `per_page` is clamped to `1..=MAX_PER_PAGE`.
    pub fn normalized(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        (page, per_page)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub users_by_role: BTreeMap<String, i64>,
    pub shelves_by_status: BTreeMap<String, i64>,
    pub rentals_by_status: BTreeMap<String, i64>,
    pub order_count: i64,
    pub revenue: Decimal,
}

#[derive(FromRow)]
struct Bucket {
    label: String,
    count: i64,
}

async fn count_by(
    state: &AppState,
    table: &str,
    column: &str,
) -> Result<BTreeMap<String, i64>, AppError> {
    let buckets = sqlx::query_as::<_, Bucket>(&format!(
        "SELECT {col} AS label, COUNT(*) AS count FROM {table} GROUP BY {col}",
        col = column,
        table = table
    ))
    .fetch_all(&state.db_pool)
    .await?;
    Ok(buckets.into_iter().map(|b| (b.label, b.count)).collect())
}

pub async fn stats(state: &AppState) -> Result<PlatformStats, AppError> {
    let totals: Vec<String> = sqlx::query_scalar("SELECT total FROM orders")
        .fetch_all(&state.db_pool)
        .await?;
    let mut revenue = Decimal::ZERO;
    for total in &totals {
        revenue += parse_money(total)?;
    }

    Ok(PlatformStats {
        users_by_role: count_by(state, "users", "role").await?,
        shelves_by_status: count_by(state, "shelves", "status").await?,
        rentals_by_status: count_by(state, "rental_requests", "status").await?,
        order_count: totals.len() as i64,
        revenue,
    })
}

async fn paginate<T>(
    state: &AppState,
    table: &str,
    query: PageQuery,
) -> Result<Page<T>, AppError>
where
    T: for<'r> FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
{
    let (page, per_page) = query.normalized();
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(&state.db_pool)
        .await?;
    let items = sqlx::query_as::<_, T>(&format!(
        "SELECT * FROM {} ORDER BY id DESC LIMIT $1 OFFSET $2",
        table
    ))
    .bind(per_page)
    .bind((page - 1).saturating_mul(per_page))
    .fetch_all(&state.db_pool)
    .await?;
    Ok(Page {
        items,
        page,
        per_page,
        total,
        total_pages: (total + per_page - 1) / per_page,
    })
}

pub async fn users(state: &AppState, query: PageQuery) -> Result<Page<User>, AppError> {
    paginate(state, "users", query).await
}

pub async fn shelves(state: &AppState, query: PageQuery) -> Result<Page<Shelf>, AppError> {
    paginate(state, "shelves", query).await
}

pub async fn rentals(state: &AppState, query: PageQuery) -> Result<Page<RentalRequest>, AppError> {
    paginate(state, "rental_requests", query).await
}

pub async fn orders(state: &AppState, query: PageQuery) -> Result<Page<Order>, AppError> {
    paginate(state, "orders", query).await
}
