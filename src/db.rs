use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use crate::{
    errors::AppError,
    structs::{PlatformSetting, Product, Role, Shelf, ShelfStatus, Store, User},
    utils::{hash_password, now_string},
    AppState,
};

/// Products carry the store of the shelf they sit on.
pub const PRODUCT_SELECT: &str = "SELECT p.id, p.brand_owner_id, p.shelf_id, s.store_id AS store_id, \
     p.name, p.price, p.stock, p.created_at, p.updated_at \
     FROM products p LEFT JOIN shelves s ON s.id = p.shelf_id";

pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .read_only(false)
        .busy_timeout(std::time::Duration::from_secs(5));

    // an in-memory database only lives as long as its single connection
    let max_connections = if database_url.contains(":memory:") { 1 } else { 8 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(opts)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    log::info!("Database migrated successfully");
    Ok(pool)
}

// ---- users ----

pub async fn get_user_by_id(state: &AppState, id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(user)
}

pub async fn get_user_by_email(state: &AppState, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(&state.db_pool)
        .await?;
    Ok(user)
}

pub async fn create_user(
    state: &AppState,
    email: String,
    password: &str,
    role: Role,
    display_name: String,
) -> Result<User, AppError> {
    if get_user_by_email(state, &email).await?.is_some() {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }
    let created_at = now_string();
    let pwd_hash = hash_password(password)?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, pwd_hash, role, display_name, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(email)
    .bind(pwd_hash)
    .bind(role)
    .bind(display_name)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(&state.db_pool)
    .await?;
    log::info!("User created: id={} role={}", user.id, role.as_str());
    Ok(user)
}

pub async fn update_user_password(
    state: &AppState,
    id: i64,
    password: &str,
) -> Result<(), AppError> {
    let pwd_hash = hash_password(password)?;
    sqlx::query("UPDATE users SET pwd_hash = $1, updated_at = $2 WHERE id = $3")
        .bind(pwd_hash)
        .bind(now_string())
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    log::info!("Password changed for user {}", id);
    Ok(())
}

/// Creates the configured admin account when it does not exist yet.
pub async fn seed_admin(state: &AppState) -> Result<(), AppError> {
    let (Some(email), Some(password)) = (
        state.config.admin_email.clone(),
        state.config.admin_password.clone(),
    ) else {
        return Ok(());
    };
    let email = email.to_lowercase();
    if get_user_by_email(state, &email).await?.is_some() {
        return Ok(());
    }
    create_user(state, email, &password, Role::Admin, "Administrator".to_string()).await?;
    log::info!("Seeded admin account");
    Ok(())
}

// ---- stores & shelves ----

pub async fn create_store(
    state: &AppState,
    owner_id: i64,
    name: String,
    city: String,
) -> Result<Store, AppError> {
    let created_at = now_string();
    let store = sqlx::query_as::<_, Store>(
        "INSERT INTO stores (owner_id, name, city, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(owner_id)
    .bind(name)
    .bind(city)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(&state.db_pool)
    .await?;
    log::info!("Store created: {:?}", store);
    Ok(store)
}

pub async fn get_store_by_id(state: &AppState, id: i64) -> Result<Store, AppError> {
    sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Store {}", id)))
}

pub async fn get_stores_by_owner(state: &AppState, owner_id: i64) -> Result<Vec<Store>, AppError> {
    let stores = sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE owner_id = $1 ORDER BY id")
        .bind(owner_id)
        .fetch_all(&state.db_pool)
        .await?;
    Ok(stores)
}

pub async fn create_shelf(
    state: &AppState,
    store_id: i64,
    name: String,
    monthly_price: String,
) -> Result<Shelf, AppError> {
    let created_at = now_string();
    let shelf = sqlx::query_as::<_, Shelf>(
        "INSERT INTO shelves (store_id, name, monthly_price, status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(store_id)
    .bind(name)
    .bind(monthly_price)
    .bind(ShelfStatus::Available)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(&state.db_pool)
    .await?;
    log::info!("Shelf created: id={} store={}", shelf.id, store_id);
    Ok(shelf)
}

pub async fn get_shelf_by_id(state: &AppState, id: i64) -> Result<Shelf, AppError> {
    sqlx::query_as::<_, Shelf>("SELECT * FROM shelves WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Shelf {}", id)))
}

pub async fn get_shelves_by_store(state: &AppState, store_id: i64) -> Result<Vec<Shelf>, AppError> {
    let shelves =
        sqlx::query_as::<_, Shelf>("SELECT * FROM shelves WHERE store_id = $1 ORDER BY id")
            .bind(store_id)
            .fetch_all(&state.db_pool)
            .await?;
    Ok(shelves)
}

pub async fn get_available_shelves(state: &AppState) -> Result<Vec<Shelf>, AppError> {
    let shelves = sqlx::query_as::<_, Shelf>("SELECT * FROM shelves WHERE status = $1 ORDER BY id")
        .bind(ShelfStatus::Available)
        .fetch_all(&state.db_pool)
        .await?;
    Ok(shelves)
}

/// Changes a shelf's status. A rented shelf only frees up when its rental completes.
pub async fn set_shelf_status(
    state: &AppState,
    id: i64,
    status: ShelfStatus,
) -> Result<(), AppError> {
    let result =
        sqlx::query("UPDATE shelves SET status = $1, updated_at = $2 WHERE id = $3 AND status != $4")
            .bind(status)
            .bind(now_string())
            .bind(id)
            .bind(ShelfStatus::Rented)
            .execute(&state.db_pool)
            .await?;
    if result.rows_affected() == 0 {
        let shelf = get_shelf_by_id(state, id).await?;
        return Err(AppError::Conflict(format!(
            "Shelf {} is {}",
            shelf.id,
            shelf.status.as_str()
        )));
    }
    log::info!("Shelf {} is now {}", id, status.as_str());
    Ok(())
}

// ---- products ----

pub async fn create_product(
    state: &AppState,
    brand_owner_id: i64,
    name: String,
    price: String,
    stock: i64,
) -> Result<Product, AppError> {
    let created_at = now_string();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO products (brand_owner_id, name, price, stock, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(brand_owner_id)
    .bind(name)
    .bind(price)
    .bind(stock)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(&state.db_pool)
    .await?;
    get_product_by_id(state, id).await
}

pub async fn get_product_by_id(state: &AppState, id: i64) -> Result<Product, AppError> {
    sqlx::query_as::<_, Product>(&format!("{} WHERE p.id = $1", PRODUCT_SELECT))
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", id)))
}

pub async fn get_products_by_brand(
    state: &AppState,
    brand_owner_id: i64,
) -> Result<Vec<Product>, AppError> {
    let products = sqlx::query_as::<_, Product>(&format!(
        "{} WHERE p.brand_owner_id = $1 ORDER BY p.id",
        PRODUCT_SELECT
    ))
    .bind(brand_owner_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(products)
}

/// In-stock products currently placed on a shelf.
pub async fn get_shelf_products(state: &AppState, shelf_id: i64) -> Result<Vec<Product>, AppError> {
    let products = sqlx::query_as::<_, Product>(&format!(
        "{} WHERE p.shelf_id = $1 AND p.stock > 0 ORDER BY p.name",
        PRODUCT_SELECT
    ))
    .bind(shelf_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(products)
}

pub async fn update_product_stock(state: &AppState, id: i64, stock: i64) -> Result<(), AppError> {
    if stock < 0 {
        return Err(AppError::Validation("Stock cannot be negative".to_string()));
    }
    sqlx::query("UPDATE products SET stock = $1, updated_at = $2 WHERE id = $3")
        .bind(stock)
        .bind(now_string())
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    Ok(())
}

// ---- platform settings ----

pub async fn get_settings(state: &AppState) -> Result<Vec<PlatformSetting>, AppError> {
    let settings = sqlx::query_as::<_, PlatformSetting>("SELECT * FROM platform_settings ORDER BY key")
        .fetch_all(&state.db_pool)
        .await?;
    Ok(settings)
}

pub async fn upsert_setting(
    state: &AppState,
    key: &str,
    value: &str,
) -> Result<PlatformSetting, AppError> {
    let setting = sqlx::query_as::<_, PlatformSetting>(
        "INSERT INTO platform_settings (key, value, updated_at) VALUES ($1, $2, $3) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at \
         RETURNING *",
    )
    .bind(key)
    .bind(value)
    .bind(now_string())
    .fetch_one(&state.db_pool)
    .await?;
    log::info!("Platform setting {} updated", key);
    Ok(setting)
}
