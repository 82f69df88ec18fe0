use actix_identity::Identity;
use actix_web::{get, put, web, Responder};
use serde::Deserialize;

use crate::{
    admin::{self, PageQuery},
    db,
    errors::AppError,
    routes::{ok, require_role},
    structs::Role,
    AppState,
};

#[get("/admin/stats")]
pub async fn stats_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    require_role(&state, identity, Role::Admin).await?;
    Ok(ok(admin::stats(&state).await?))
}

#[get("/admin/users")]
pub async fn users_handler(
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    require_role(&state, identity, Role::Admin).await?;
    Ok(ok(admin::users(&state, query.into_inner()).await?))
}

#[get("/admin/shelves")]
pub async fn shelves_handler(
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    require_role(&state, identity, Role::Admin).await?;
    Ok(ok(admin::shelves(&state, query.into_inner()).await?))
}

#[get("/admin/rentals")]
pub async fn rentals_handler(
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    require_role(&state, identity, Role::Admin).await?;
    Ok(ok(admin::rentals(&state, query.into_inner()).await?))
}

#[get("/admin/orders")]
pub async fn orders_handler(
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    require_role(&state, identity, Role::Admin).await?;
    Ok(ok(admin::orders(&state, query.into_inner()).await?))
}

#[get("/admin/settings")]
pub async fn settings_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    require_role(&state, identity, Role::Admin).await?;
    Ok(ok(db::get_settings(&state).await?))
}

#[derive(Deserialize)]
pub struct SettingValue {
    value: String,
}

#[put("/admin/settings/{key}")]
pub async fn update_setting_handler(
    path: web::Path<String>,
    web::Json(form): web::Json<SettingValue>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    require_role(&state, identity, Role::Admin).await?;
    let key = path.into_inner();
    if key.trim().is_empty() || key.len() > 64 {
        return Err(AppError::Validation("Invalid setting key".to_string()));
    }
    Ok(ok(db::upsert_setting(&state, key.trim(), &form.value).await?))
}

#[cfg(test)]
mod tests {
    use actix_web::{cookie::Cookie, http::StatusCode, test};
    use serde_json::{json, Value};

    use crate::testing::{carry_cookie, seed_marketplace, test_state, SEED_PASSWORD};

    #[actix_web::test]
    async fn admin_only_dashboard() {
        let (state, _sms) = test_state().await;
        let m = seed_marketplace(&state).await;
        let app = crate::test_app!(state);

        let mut brand: Option<Cookie<'static>> = None;
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_json(json!({ "email": m.brand.email, "password": SEED_PASSWORD }))
                .to_request(),
        )
        .await;
        carry_cookie(&resp, &mut brand);
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/admin/stats")
                .cookie(brand.unwrap())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let mut admin: Option<Cookie<'static>> = None;
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_json(json!({ "email": m.admin.email, "password": SEED_PASSWORD }))
                .to_request(),
        )
        .await;
        carry_cookie(&resp, &mut admin);
        let admin = admin.unwrap();

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/admin/shelves?page=1&per_page=1")
                .cookie(admin.clone())
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

        let resp = test::call_service(
            &app,
            test::TestRequest::put()
                .uri("/admin/settings/commission_percent")
                .cookie(admin.clone())
                .set_json(json!({ "value": "10" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/admin/settings")
                .cookie(admin)
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"][0]["key"], "commission_percent");
        assert_eq!(body["data"][0]["value"], "10");
    }
}
