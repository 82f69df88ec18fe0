use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::rentals::{ClearanceStatus, RentalStatus};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    StoreOwner,
    BrandOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::StoreOwner => "store_owner",
            Role::BrandOwner => "brand_owner",
            Role::Admin => "admin",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShelfStatus {
    Available,
    Rented,
    Maintenance,
}

impl ShelfStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShelfStatus::Available => "available",
            ShelfStatus::Rented => "rented",
            ShelfStatus::Maintenance => "maintenance",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub pwd_hash: String,
    pub role: Role,
    pub display_name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Store {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub city: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Shelf {
    pub id: i64,
    pub store_id: i64,
    pub name: String,
    pub monthly_price: String,
    pub status: ShelfStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Shelf {
    /// Path printed into the shelf's QR code.
    pub fn qr_path(&self) -> String {
        format!("/shop/{}", self.id)
    }
}

/// Product joined with the store of the shelf it is placed on, if any.
#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Product {
    pub id: i64,
    pub brand_owner_id: i64,
    pub shelf_id: Option<i64>,
    pub store_id: Option<i64>,
    pub name: String,
    pub price: String,
    pub stock: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct RentalRequest {
    pub id: i64,
    pub shelf_id: i64,
    pub brand_owner_id: i64,
    pub store_owner_id: i64,
    pub start_date: String,
    pub end_date: String,
    pub monthly_price: String,
    pub status: RentalStatus,
    pub clearance_status: ClearanceStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Conversation {
    pub id: i64,
    pub rental_request_id: i64,
    pub brand_owner_id: i64,
    pub store_owner_id: i64,
    pub brand_unread: i64,
    pub store_unread: i64,
    pub last_message_at: Option<String>,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub body: String,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub store_id: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub subtotal: String,
    pub tax: String,
    pub total: String,
    pub payment_method: String,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct PlatformSetting {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
