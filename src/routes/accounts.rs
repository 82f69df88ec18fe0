use actix_identity::Identity;
use actix_web::{get, post, web, HttpMessage, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use crate::{
    db,
    errors::AppError,
    routes::{current_user, ok},
    structs::Role,
    utils::{validate_password_strength, verify_password},
    AppState,
};

#[derive(Deserialize)]
pub struct Register {
    email: String,
    password: String,
    password2: String,
    role: Role,
    display_name: String,
}

#[post("/register")]
pub async fn register_handler(
    web::Json(form): web::Json<Register>,
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<impl Responder, AppError> {
    if form.email.trim().is_empty() || form.password.is_empty() || form.display_name.trim().is_empty()
    {
        return Err(AppError::Validation("All fields are required".to_string()));
    }
    if form.password != form.password2 {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    if !form.email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if form.role == Role::Admin {
        return Err(AppError::Forbidden(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }
    validate_password_strength(&form.password)?;

    let user = db::create_user(
        &state,
        form.email.trim().to_lowercase(),
        &form.password,
        form.role,
        form.display_name.trim().to_string(),
    )
    .await?;

    Identity::login(&request.extensions(), user.id.to_string())
        .map_err(|e| AppError::IdentityError(e.to_string()))?;

    Ok(HttpResponse::Created().json(serde_json::json!({ "success": true, "data": user })))
}

#[derive(Deserialize)]
pub struct Login {
    email: String,
    password: String,
}

#[post("/login")]
pub async fn login_handler(
    web::Json(form): web::Json<Login>,
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<impl Responder, AppError> {
    if form.email.is_empty() || form.password.is_empty() {
        return Err(AppError::Validation("All fields are required".to_string()));
    }
    let lc_email = form.email.trim().to_lowercase();

    let Some(user) = db::get_user_by_email(&state, &lc_email).await? else {
        return Err(AppError::Unauthorized);
    };
    if !verify_password(&form.password, &user.pwd_hash)? {
        log::warn!("Failed login for user {}", user.id);
        return Err(AppError::Unauthorized);
    }

    Identity::login(&request.extensions(), user.id.to_string())
        .map_err(|e| AppError::IdentityError(e.to_string()))?;
    log::info!("User {} logged in", user.id);
    Ok(ok(user))
}

#[post("/logout")]
pub async fn logout_handler(user: Option<Identity>) -> impl Responder {
    if let Some(user) = user {
        user.logout();
    }
    ok(())
}

#[get("/me")]
pub async fn me_handler(
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;
    Ok(ok(user))
}

#[derive(Deserialize)]
pub struct ChangePwdForm {
    old_password: String,
    password: String,
    password2: String,
}

#[post("/change-pwd")]
pub async fn change_pwd_handler(
    web::Json(form): web::Json<ChangePwdForm>,
    state: web::Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let user = current_user(&state, identity).await?;

    if form.old_password.is_empty() || form.password.is_empty() || form.password2.is_empty() {
        return Err(AppError::Validation("All fields are required".to_string()));
    }
    if form.password != form.password2 {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    validate_password_strength(&form.password)?;

    if !verify_password(&form.old_password, &user.pwd_hash)? {
        log::warn!("Old password verification failed for user ID: {}", user.id);
        return Err(AppError::Forbidden("Old password is incorrect".to_string()));
    }
    db::update_user_password(&state, user.id, &form.password).await?;
    Ok(ok(()))
}
