//! Conversations, messages and the notification inbox.

use actix_identity::Identity;
use actix_web::{get, post, web, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::{
    chat,
    errors::AppError,
    notifications,
    routes::{current_user, ok},
    AppState,
};

#[get("/conversations")]
pub async fn list_conversations_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    Ok(ok(chat::list_conversations(&state, &user).await?))
}

#[get("/conversations/{conversation_id}/messages")]
pub async fn read_messages_handler(
    path: web::Path<i64>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    Ok(ok(chat::read_messages(&state, &user, path.into_inner()).await?))
}

#[derive(Deserialize)]
pub struct NewMessage {
    body: String,
}

#[post("/conversations/{conversation_id}/messages")]
pub async fn send_message_handler(
    path: web::Path<i64>,
    web::Json(form): web::Json<NewMessage>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let message = chat::send_message(&state, &user, path.into_inner(), &form.body).await?;
    Ok(ok(message))
}

#[get("/notifications")]
pub async fn list_notifications_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let items = notifications::list_for_user(&state, user.id).await?;
    let unread = notifications::unread_count(&state, user.id).await?;
    Ok(ok(json!({ "unread": unread, "items": items })))
}

#[post("/notifications/{notification_id}/read")]
pub async fn mark_read_handler(
    path: web::Path<i64>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    notifications::mark_read(&state, user.id, path.into_inner()).await?;
    Ok(ok(()))
}

#[post("/notifications/read-all")]
pub async fn mark_all_read_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    let updated = notifications::mark_all_read(&state, user.id).await?;
    Ok(ok(json!({ "updated": updated })))
}

#[cfg(test)]
mod tests {
    use actix_web::{cookie::Cookie, http::StatusCode, test};
    use serde_json::{json, Value};

    use crate::{
        rentals::{self, NewRentalRequest},
        testing::{carry_cookie, seed_marketplace, test_state, SEED_PASSWORD},
    };

    #[actix_web::test]
    async fn store_owner_reads_inbox_and_replies() {
        let (state, _sms) = test_state().await;
        let m = seed_marketplace(&state).await;
        let rental = rentals::create(
            &state,
            &m.brand,
            NewRentalRequest {
                shelf_id: m.free_shelf.id,
                start_date: "2025-07-01".parse().unwrap(),
                end_date: "2025-07-31".parse().unwrap(),
                product_ids: vec![],
            },
        )
        .await
        .unwrap();
        let app = crate::test_app!(state);

        let mut jar: Option<Cookie<'static>> = None;
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_json(json!({ "email": m.store_owner.email, "password": SEED_PASSWORD }))
                .to_request(),
        )
        .await;
        carry_cookie(&resp, &mut jar);
        let owner = jar.unwrap();

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/notifications")
                .cookie(owner.clone())
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["unread"], 1);
        assert_eq!(body["data"]["items"][0]["kind"], "rental_requested");

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/conversations")
                .cookie(owner.clone())
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"][0]["rental_request_id"], rental.id);
        let conversation_id = body["data"][0]["id"].as_i64().unwrap();

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/conversations/{}/messages", conversation_id))
                .cookie(owner.clone())
                .set_json(json!({ "body": "" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/conversations/{}/messages", conversation_id))
                .cookie(owner.clone())
                .set_json(json!({ "body": "Welcome aboard" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["sender_id"], m.store_owner.id);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/notifications/read-all")
                .cookie(owner)
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["updated"], 1);
    }
}
