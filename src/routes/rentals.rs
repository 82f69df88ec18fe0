use actix_identity::Identity;
use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::AppError,
    rentals::{self, ClearanceStatus, NewRentalRequest, RentalAction},
    routes::{current_user, ok},
    AppState,
};

#[post("/rentals")]
pub async fn create_rental_handler(
    web::Json(form): web::Json<NewRentalRequest>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let rental = rentals::create(&state, &user, form).await?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "data": rental })))
}

#[get("/rentals")]
pub async fn list_rentals_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    Ok(ok(rentals::list_for_user(&state, &user).await?))
}

#[get("/rentals/{rental_id}")]
pub async fn get_rental_handler(
    path: web::Path<i64>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let rental = rentals::get_rental(&state, path.into_inner()).await?;
    rentals::ensure_participant(&user, &rental)?;
    let product_ids = rentals::product_ids(&state, rental.id).await?;
    Ok(ok(json!({ "rental": rental, "product_ids": product_ids })))
}

#[derive(Deserialize)]
pub struct TransitionForm {
    action: RentalAction,
}

#[post("/rentals/{rental_id}/transition")]
pub async fn transition_handler(
    path: web::Path<i64>,
    web::Json(form): web::Json<TransitionForm>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let rental = rentals::transition(&state, &user, path.into_inner(), form.action).await?;
    Ok(ok(rental))
}

#[derive(Deserialize, Default)]
pub struct AdvanceForm {
    /// When given, the step the caller expects to move into.
    #[serde(default)]
    next: Option<ClearanceStatus>,
}

#[post("/rentals/{rental_id}/clearance/advance")]
pub async fn advance_clearance_handler(
    path: web::Path<i64>,
    form: Option<web::Json<AdvanceForm>>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let expected = form.map(|f| f.into_inner()).unwrap_or_default().next;
    let rental = rentals::advance_clearance(&state, &user, path.into_inner(), expected).await?;
    Ok(ok(rental))
}

#[cfg(test)]
mod tests {
    use actix_web::{cookie::Cookie, http::StatusCode, test};
    use serde_json::{json, Value};

    use crate::testing::{carry_cookie, seed_marketplace, test_state, SEED_PASSWORD};

    macro_rules! login {
        ($app:expr, $email:expr) => {{
            let resp = test::call_service(
                &$app,
                test::TestRequest::post()
                    .uri("/login")
                    .set_json(json!({ "email": $email, "password": SEED_PASSWORD }))
                    .to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::OK);
            let mut jar: Option<Cookie<'static>> = None;
            carry_cookie(&resp, &mut jar);
            jar.unwrap()
        }};
    }

    #[actix_web::test]
    async fn request_accept_and_wrong_step() {
        let (state, _sms) = test_state().await;
        let m = seed_marketplace(&state).await;
        let app = crate::test_app!(state);
        let brand = login!(app, m.brand.email);
        let owner = login!(app, m.store_owner.email);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/rentals")
                .cookie(brand.clone())
                .set_json(json!({
                    "shelf_id": m.free_shelf.id,
                    "start_date": "2025-07-01",
                    "end_date": "2025-09-30",
                    "product_ids": [m.unplaced_product.id]
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        let id = body["data"]["id"].as_i64().unwrap();
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["clearance_status"], "not_started");

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/rentals/{}/transition", id))
                .cookie(owner.clone())
                .set_json(json!({ "action": "confirm_payment" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/rentals/{}/transition", id))
                .cookie(owner.clone())
                .set_json(json!({ "action": "accept" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/rentals/{}/transition", id))
                .cookie(owner.clone())
                .set_json(json!({ "action": "reject" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Cannot move from 'accepted' to 'rejected'");

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/rentals/{}", id))
                .cookie(brand.clone())
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["rental"]["status"], "accepted");
        assert_eq!(body["data"]["product_ids"], json!([m.unplaced_product.id]));
    }
}
