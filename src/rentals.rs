//! Shelf rental requests and the clearance that closes them out.

use serde::{Deserialize, Serialize};

use crate::{
    chat, db,
    errors::AppError,
    notifications::{self, NotificationKind},
    structs::{RentalRequest, Role, ShelfStatus, User},
    utils::now_string,
    AppState,
};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    Pending,
    Accepted,
    PaymentPending,
    Active,
    Completed,
    Rejected,
    Cancelled,
}

impl RentalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Pending => "pending",
            RentalStatus::Accepted => "accepted",
            RentalStatus::PaymentPending => "payment_pending",
            RentalStatus::Active => "active",
            RentalStatus::Completed => "completed",
            RentalStatus::Rejected => "rejected",
            RentalStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: RentalStatus) -> bool {
        use RentalStatus::*;
        matches!(
            (*self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Accepted, PaymentPending)
                | (Accepted, Cancelled)
                | (PaymentPending, Active)
                | (Active, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RentalStatus::Completed | RentalStatus::Rejected | RentalStatus::Cancelled
        )
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClearanceStatus {
    NotStarted,
    InventoryCheck,
    ReturnShipment,
    Settlement,
    Payment,
    Closed,
}

impl ClearanceStatus {
    pub const ORDER: [ClearanceStatus; 6] = [
        ClearanceStatus::NotStarted,
        ClearanceStatus::InventoryCheck,
        ClearanceStatus::ReturnShipment,
        ClearanceStatus::Settlement,
        ClearanceStatus::Payment,
        ClearanceStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClearanceStatus::NotStarted => "not_started",
            ClearanceStatus::InventoryCheck => "inventory_check",
            ClearanceStatus::ReturnShipment => "return_shipment",
            ClearanceStatus::Settlement => "settlement",
            ClearanceStatus::Payment => "payment",
            ClearanceStatus::Closed => "closed",
        }
    }

    pub fn next(&self) -> Option<ClearanceStatus> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

/// Actions a participant can take on a rental request.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RentalAction {
    Accept,
    Reject,
    RequestPayment,
    ConfirmPayment,
    Complete,
    Cancel,
}

impl RentalAction {
    pub fn target(&self) -> RentalStatus {
        match self {
            RentalAction::Accept => RentalStatus::Accepted,
            RentalAction::Reject => RentalStatus::Rejected,
            RentalAction::RequestPayment => RentalStatus::PaymentPending,
            RentalAction::ConfirmPayment => RentalStatus::Active,
            RentalAction::Complete => RentalStatus::Completed,
            RentalAction::Cancel => RentalStatus::Cancelled,
        }
    }

    fn permitted(&self, actor: &User, rental: &RentalRequest) -> bool {
        let is_store = actor.role == Role::StoreOwner && actor.id == rental.store_owner_id;
        let is_brand = actor.role == Role::BrandOwner && actor.id == rental.brand_owner_id;
        let is_admin = actor.role == Role::Admin;
        match self {
            RentalAction::Accept | RentalAction::Reject => is_store,
            RentalAction::RequestPayment | RentalAction::Cancel => is_brand,
            RentalAction::ConfirmPayment => is_admin,
            RentalAction::Complete => is_store || is_admin,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRentalRequest {
    pub shelf_id: i64,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    #[serde(default)]
    pub product_ids: Vec<i64>,
}

pub async fn get_rental(state: &AppState, id: i64) -> Result<RentalRequest, AppError> {
    sqlx::query_as::<_, RentalRequest>("SELECT * FROM rental_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Rental request {}", id)))
}

/// Rentals visible to `user`: their own as brand or store owner, all for admins.
pub async fn list_for_user(state: &AppState, user: &User) -> Result<Vec<RentalRequest>, AppError> {
    let rentals = match user.role {
        Role::Admin => {
            sqlx::query_as::<_, RentalRequest>("SELECT * FROM rental_requests ORDER BY id DESC")
                .fetch_all(&state.db_pool)
                .await?
        }
        Role::BrandOwner | Role::StoreOwner => {
            sqlx::query_as::<_, RentalRequest>(
                "SELECT * FROM rental_requests \
                 WHERE brand_owner_id = $1 OR store_owner_id = $1 ORDER BY id DESC",
            )
            .bind(user.id)
            .fetch_all(&state.db_pool)
            .await?
        }
    };
    Ok(rentals)
}

pub fn ensure_participant(user: &User, rental: &RentalRequest) -> Result<(), AppError> {
    if user.role == Role::Admin || user.id == rental.brand_owner_id || user.id == rental.store_owner_id
    {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not a party to this rental".to_string()))
    }
}

pub async fn product_ids(state: &AppState, rental_id: i64) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT product_id FROM rental_request_products WHERE rental_request_id = $1 ORDER BY product_id",
    )
    .bind(rental_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(ids)
}

pub async fn create(
    state: &AppState,
    brand: &User,
    input: NewRentalRequest,
) -> Result<RentalRequest, AppError> {
    if brand.role != Role::BrandOwner {
        return Err(AppError::Forbidden(
            "Only brand owners can request shelves".to_string(),
        ));
    }
    if input.end_date < input.start_date {
        return Err(AppError::Validation(
            "End date cannot be before start date".to_string(),
        ));
    }
    let shelf = db::get_shelf_by_id(state, input.shelf_id).await?;
    if shelf.status != ShelfStatus::Available {
        return Err(AppError::Conflict(format!(
            "Shelf {} is {}",
            shelf.id,
            shelf.status.as_str()
        )));
    }
    for product_id in &input.product_ids {
        let product = db::get_product_by_id(state, *product_id).await?;
        if product.brand_owner_id != brand.id {
            return Err(AppError::Forbidden(format!(
                "Product {} belongs to another brand",
                product_id
            )));
        }
    }
    let store = db::get_store_by_id(state, shelf.store_id).await?;

    let created_at = now_string();
    let mut tx = state.db_pool.begin().await?;
    let rental = sqlx::query_as::<_, RentalRequest>(
        "INSERT INTO rental_requests (shelf_id, brand_owner_id, store_owner_id, start_date, \
         end_date, monthly_price, status, clearance_status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(shelf.id)
    .bind(brand.id)
    .bind(store.owner_id)
    .bind(input.start_date.to_string())
    .bind(input.end_date.to_string())
    .bind(&shelf.monthly_price)
    .bind(RentalStatus::Pending)
    .bind(ClearanceStatus::NotStarted)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(&mut *tx)
    .await?;

    for product_id in &input.product_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO rental_request_products (rental_request_id, product_id) \
             VALUES ($1, $2)",
        )
        .bind(rental.id)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    }

    chat::open_conversation(&mut tx, &rental).await?;
    let rental_id = rental.id.to_string();
    notifications::notify(
        &mut tx,
        rental.store_owner_id,
        NotificationKind::RentalRequested,
        &[
            ("brand", brand.display_name.as_str()),
            ("shelf", shelf.name.as_str()),
            ("rental_id", rental_id.as_str()),
        ],
    )
    .await?;
    tx.commit().await?;
    log::info!(
        "Rental request {} created: shelf={} brand={}",
        rental.id,
        shelf.id,
        brand.id
    );
    Ok(rental)
}

/// Applies `action` if `actor` may take it and the status table allows it.
pub async fn transition(
    state: &AppState,
    actor: &User,
    rental_id: i64,
    action: RentalAction,
) -> Result<RentalRequest, AppError> {
    let rental = get_rental(state, rental_id).await?;
    if !action.permitted(actor, &rental) {
        return Err(AppError::Forbidden(format!(
            "You cannot {:?} this rental",
            action
        )));
    }
    let next = action.target();
    if rental.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Rental request {} is already {}",
            rental.id,
            rental.status.as_str()
        )));
    }
    if !rental.status.can_transition_to(next) {
        return Err(AppError::InvalidTransition {
            from: rental.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    let mut tx = state.db_pool.begin().await?;
    if next == RentalStatus::Accepted {
        let booked: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rental_requests \
             WHERE shelf_id = $1 AND id != $2 AND status IN ($3, $4, $5)",
        )
        .bind(rental.shelf_id)
        .bind(rental.id)
        .bind(RentalStatus::Accepted)
        .bind(RentalStatus::PaymentPending)
        .bind(RentalStatus::Active)
        .fetch_one(&mut *tx)
        .await?;
        if booked > 0 {
            tx.rollback().await?;
            return Err(AppError::Conflict(format!(
                "Shelf {} is already promised to another rental",
                rental.shelf_id
            )));
        }
    }

    // the status guard keeps two concurrent actions from both applying
    let updated = sqlx::query_as::<_, RentalRequest>(
        "UPDATE rental_requests SET status = $1, updated_at = $2 \
         WHERE id = $3 AND status = $4 RETURNING *",
    )
    .bind(next)
    .bind(now_string())
    .bind(rental.id)
    .bind(rental.status)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::Conflict("Rental was changed concurrently".to_string()))?;

    match next {
        RentalStatus::Active => {
            let taken = sqlx::query(
                "UPDATE shelves SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
            )
            .bind(ShelfStatus::Rented)
            .bind(now_string())
            .bind(rental.shelf_id)
            .bind(ShelfStatus::Available)
            .execute(&mut *tx)
            .await?;
            if taken.rows_affected() == 0 {
                tx.rollback().await?;
                log::warn!(
                    "Rental {} cannot start: shelf {} is not available",
                    rental.id,
                    rental.shelf_id
                );
                return Err(AppError::Conflict(format!(
                    "Shelf {} is not available",
                    rental.shelf_id
                )));
            }
            sqlx::query(
                "UPDATE products SET shelf_id = $1, updated_at = $2 WHERE id IN \
                 (SELECT product_id FROM rental_request_products WHERE rental_request_id = $3)",
            )
            .bind(rental.shelf_id)
            .bind(now_string())
            .bind(rental.id)
            .execute(&mut *tx)
            .await?;
        }
        RentalStatus::Completed => {
            sqlx::query("UPDATE shelves SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(ShelfStatus::Available)
                .bind(now_string())
                .bind(rental.shelf_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE products SET shelf_id = NULL, updated_at = $1 \
                 WHERE shelf_id = $2 AND brand_owner_id = $3",
            )
            .bind(now_string())
            .bind(rental.shelf_id)
            .bind(rental.brand_owner_id)
            .execute(&mut *tx)
            .await?;
        }
        _ => {}
    }

    let recipients: Vec<i64> = [updated.brand_owner_id, updated.store_owner_id]
        .into_iter()
        .filter(|id| *id != actor.id)
        .collect();
    let rental_id = updated.id.to_string();
    for recipient in recipients {
        notifications::notify(
            &mut tx,
            recipient,
            NotificationKind::RentalStatusChanged,
            &[
                ("rental_id", rental_id.as_str()),
                ("status", next.as_str()),
            ],
        )
        .await?;
    }
    tx.commit().await?;
    log::info!(
        "Rental {} moved {} -> {} by user {}",
        updated.id,
        rental.status.as_str(),
        next.as_str(),
        actor.id
    );
    Ok(updated)
}

/// Moves the clearance exactly one step forward.
pub async fn advance_clearance(
    state: &AppState,
    actor: &User,
    rental_id: i64,
    expected_next: Option<ClearanceStatus>,
) -> Result<RentalRequest, AppError> {
    let rental = get_rental(state, rental_id).await?;
    let allowed = actor.role == Role::Admin
        || (actor.role == Role::StoreOwner && actor.id == rental.store_owner_id);
    if !allowed {
        return Err(AppError::Forbidden(
            "Only the store owner or an admin can advance clearance".to_string(),
        ));
    }
    if rental.status != RentalStatus::Completed {
        return Err(AppError::Conflict(format!(
            "Clearance starts after the rental is completed (rental is {})",
            rental.status.as_str()
        )));
    }
    let Some(next) = rental.clearance_status.next() else {
        return Err(AppError::InvalidTransition {
            from: rental.clearance_status.as_str().to_string(),
            to: rental.clearance_status.as_str().to_string(),
        });
    };
    if let Some(expected) = expected_next {
        if expected != next {
            return Err(AppError::InvalidTransition {
                from: rental.clearance_status.as_str().to_string(),
                to: expected.as_str().to_string(),
            });
        }
    }

    let mut tx = state.db_pool.begin().await?;
    let updated = sqlx::query_as::<_, RentalRequest>(
        "UPDATE rental_requests SET clearance_status = $1, updated_at = $2 \
         WHERE id = $3 AND clearance_status = $4 RETURNING *",
    )
    .bind(next)
    .bind(now_string())
    .bind(rental.id)
    .bind(rental.clearance_status)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::Conflict("Clearance was changed concurrently".to_string()))?;

    let rental_id = updated.id.to_string();
    notifications::notify(
        &mut tx,
        updated.brand_owner_id,
        NotificationKind::ClearanceAdvanced,
        &[
            ("rental_id", rental_id.as_str()),
            ("status", next.as_str()),
        ],
    )
    .await?;
    tx.commit().await?;
    log::info!("Clearance for rental {} is now {}", updated.id, next.as_str());
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_marketplace, test_state};

    const ALL: [RentalStatus; 7] = [
        RentalStatus::Pending,
        RentalStatus::Accepted,
        RentalStatus::PaymentPending,
        RentalStatus::Active,
        RentalStatus::Completed,
        RentalStatus::Rejected,
        RentalStatus::Cancelled,
    ];

    #[test]
    fn main_path_is_linear() {
        use RentalStatus::*;
        let path = [Pending, Accepted, PaymentPending, Active, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
        assert!(!Pending.can_transition_to(Active));
        assert!(!Active.can_transition_to(Pending));
        assert!(!PaymentPending.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_go_nowhere() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn clearance_steps_in_order() {
        let mut status = ClearanceStatus::NotStarted;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            seen.push(next);
            status = next;
        }
        assert_eq!(seen, ClearanceStatus::ORDER.to_vec());
        assert_eq!(ClearanceStatus::Closed.next(), None);
    }

    #[actix_web::test]
    async fn full_rental_lifecycle() {
        let (state, _sms) = test_state().await;
        let m = seed_marketplace(&state).await;

        let rental = create(
            &state,
            &m.brand,
            NewRentalRequest {
                shelf_id: m.free_shelf.id,
                start_date: "2025-06-01".parse().unwrap(),
                end_date: "2025-08-31".parse().unwrap(),
                product_ids: vec![m.unplaced_product.id],
            },
        )
        .await
        .unwrap();
        assert_eq!(rental.status, RentalStatus::Pending);
        assert_eq!(rental.store_owner_id, m.store_owner.id);

        // brand cannot accept its own request
        assert!(matches!(
            transition(&state, &m.brand, rental.id, RentalAction::Accept).await,
            Err(AppError::Forbidden(_))
        ));
        // skipping ahead is rejected
        assert!(matches!(
            transition(&state, &m.brand, rental.id, RentalAction::RequestPayment).await,
            Err(AppError::InvalidTransition { .. })
        ));

        transition(&state, &m.store_owner, rental.id, RentalAction::Accept)
            .await
            .unwrap();
        transition(&state, &m.brand, rental.id, RentalAction::RequestPayment)
            .await
            .unwrap();
        let active = transition(&state, &m.admin, rental.id, RentalAction::ConfirmPayment)
            .await
            .unwrap();
        assert_eq!(active.status, RentalStatus::Active);

        let shelf = db::get_shelf_by_id(&state, m.free_shelf.id).await.unwrap();
        assert_eq!(shelf.status, ShelfStatus::Rented);
        let placed = db::get_product_by_id(&state, m.unplaced_product.id).await.unwrap();
        assert_eq!(placed.shelf_id, Some(m.free_shelf.id));

        // clearance waits for completion
        assert!(matches!(
            advance_clearance(&state, &m.store_owner, rental.id, None).await,
            Err(AppError::Conflict(_))
        ));

        transition(&state, &m.store_owner, rental.id, RentalAction::Complete)
            .await
            .unwrap();
        let shelf = db::get_shelf_by_id(&state, m.free_shelf.id).await.unwrap();
        assert_eq!(shelf.status, ShelfStatus::Available);
        let removed = db::get_product_by_id(&state, m.unplaced_product.id).await.unwrap();
        assert_eq!(removed.shelf_id, None);

        // skipping a clearance step is rejected
        assert!(matches!(
            advance_clearance(&state, &m.admin, rental.id, Some(ClearanceStatus::Settlement)).await,
            Err(AppError::InvalidTransition { .. })
        ));
        let mut last = rental.clearance_status;
        for _ in 0..5 {
            last = advance_clearance(&state, &m.store_owner, rental.id, None)
                .await
                .unwrap()
                .clearance_status;
        }
        assert_eq!(last, ClearanceStatus::Closed);
        assert!(matches!(
            advance_clearance(&state, &m.admin, rental.id, None).await,
            Err(AppError::InvalidTransition { .. })
        ));

        let unread = notifications::unread_count(&state, m.brand.id).await.unwrap();
        assert!(unread >= 7);
    }

    #[actix_web::test]
    async fn rented_shelf_refuses_new_requests() {
        let (state, _sms) = test_state().await;
        let m = seed_marketplace(&state).await;
        let result = create(
            &state,
            &m.brand,
            NewRentalRequest {
                shelf_id: m.rented_shelf.id,
                start_date: "2025-06-01".parse().unwrap(),
                end_date: "2025-06-30".parse().unwrap(),
                product_ids: vec![],
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    fn july_request(shelf_id: i64) -> NewRentalRequest {
        NewRentalRequest {
            shelf_id,
            start_date: "2025-07-01".parse().unwrap(),
            end_date: "2025-07-31".parse().unwrap(),
            product_ids: vec![],
        }
    }

    #[actix_web::test]
    async fn shelf_is_promised_to_one_rental() {
        let (state, _sms) = test_state().await;
        let m = seed_marketplace(&state).await;
        let first = create(&state, &m.brand, july_request(m.free_shelf.id))
            .await
            .unwrap();
        let second = create(&state, &m.brand, july_request(m.free_shelf.id))
            .await
            .unwrap();

        transition(&state, &m.store_owner, first.id, RentalAction::Accept)
            .await
            .unwrap();
        assert!(matches!(
            transition(&state, &m.store_owner, second.id, RentalAction::Accept).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(
            get_rental(&state, second.id).await.unwrap().status,
            RentalStatus::Pending
        );

        // once the first falls through the shelf can be promised again
        transition(&state, &m.brand, first.id, RentalAction::Cancel)
            .await
            .unwrap();
        transition(&state, &m.store_owner, second.id, RentalAction::Accept)
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn payment_fails_when_shelf_was_taken() {
        let (state, _sms) = test_state().await;
        let m = seed_marketplace(&state).await;
        let rental = create(&state, &m.brand, july_request(m.free_shelf.id))
            .await
            .unwrap();
        transition(&state, &m.store_owner, rental.id, RentalAction::Accept)
            .await
            .unwrap();
        transition(&state, &m.brand, rental.id, RentalAction::RequestPayment)
            .await
            .unwrap();
        db::set_shelf_status(&state, m.free_shelf.id, ShelfStatus::Maintenance)
            .await
            .unwrap();

        assert!(matches!(
            transition(&state, &m.admin, rental.id, RentalAction::ConfirmPayment).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(
            get_rental(&state, rental.id).await.unwrap().status,
            RentalStatus::PaymentPending
        );
        let shelf = db::get_shelf_by_id(&state, m.free_shelf.id).await.unwrap();
        assert_eq!(shelf.status, ShelfStatus::Maintenance);
        // nothing was announced for the failed step
        let unread = notifications::unread_count(&state, m.brand.id).await.unwrap();
        assert_eq!(unread, 1);
    }

    #[actix_web::test]
    async fn end_before_start_is_rejected() {
        let (state, _sms) = test_state().await;
        let m = seed_marketplace(&state).await;
        let result = create(
            &state,
            &m.brand,
            NewRentalRequest {
                shelf_id: m.free_shelf.id,
                start_date: "2025-06-30".parse().unwrap(),
                end_date: "2025-06-01".parse().unwrap(),
                product_ids: vec![],
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
