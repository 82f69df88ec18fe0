//! One-time phone verification codes and their delivery.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::json;
use sqlx::FromRow;

use crate::{errors::AppError, AppState};

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<(), AppError>;
}

/// Writes the message to the log instead of sending it. Used when no gateway
/// is configured.
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send(&self, phone: &str, message: &str) -> Result<(), AppError> {
        log::info!("SMS to {}: {}", phone, message);
        Ok(())
    }
}

/// Posts `{"to", "message"}` as JSON to an SMS gateway.
pub struct HttpSmsSender {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpSmsSender {
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            token,
        }
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    async fn send(&self, phone: &str, message: &str) -> Result<(), AppError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&json!({ "to": phone, "message": message }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            log::error!("SMS gateway unreachable: {}", e);
            AppError::SmsError(e.to_string())
        })?;
        if !response.status().is_success() {
            log::error!("SMS gateway answered {}", response.status());
            return Err(AppError::SmsError(format!(
                "gateway answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
struct PhoneVerification {
    code: String,
    attempts: i64,
    expires_at: String,
    created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    Invalid { attempts_left: i64 },
    Expired,
    Missing,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::DatabaseError(sqlx::Error::Decode(Box::new(e))))
}

pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

/// Issues a fresh code for `phone`, replacing any previous one, and sends it.
pub async fn issue_code(state: &AppState, phone: &str) -> Result<(), AppError> {
    let now = Utc::now();
    let existing = sqlx::query_as::<_, PhoneVerification>(
        "SELECT code, attempts, expires_at, created_at FROM phone_verifications WHERE phone = $1",
    )
    .bind(phone)
    .fetch_optional(&state.db_pool)
    .await?;

    if let Some(existing) = existing {
        let issued = parse_time(&existing.created_at)?;
        let cooldown = Duration::seconds(state.config.otp_resend_cooldown_secs);
        if now < issued + cooldown {
            let wait = (issued + cooldown - now).num_seconds().max(1);
            return Err(AppError::Conflict(format!(
                "Please wait {} seconds before requesting a new code",
                wait
            )));
        }
    }

    let code = generate_code();
    let expires_at = now + Duration::seconds(state.config.otp_ttl_secs);
    sqlx::query(
        "INSERT INTO phone_verifications (phone, code, attempts, expires_at, created_at) \
         VALUES ($1, $2, 0, $3, $4) \
         ON CONFLICT(phone) DO UPDATE SET code = excluded.code, attempts = 0, \
         expires_at = excluded.expires_at, created_at = excluded.created_at",
    )
    .bind(phone)
    .bind(&code)
    .bind(expires_at.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&state.db_pool)
    .await?;

    let message = format!("Your Shibr verification code is {}", code);
    if let Err(e) = state.sms.send(phone, &message).await {
        // an undelivered code must not start the resend cooldown
        delete_code(state, phone).await?;
        return Err(e);
    }
    log::info!("Verification code issued for {}", phone);
    Ok(())
}

/// Checks `code` against the live code for `phone`. A valid code is consumed;
/// a wrong one burns an attempt, and the last allowed attempt burns the code.
///
/// Used, expired and burned codes keep their row with an empty code, so the
/// resend cooldown still counts from when they were issued.
pub async fn check_code(state: &AppState, phone: &str, code: &str) -> Result<CodeCheck, AppError> {
    let Some(row) = sqlx::query_as::<_, PhoneVerification>(
        "SELECT code, attempts, expires_at, created_at FROM phone_verifications WHERE phone = $1",
    )
    .bind(phone)
    .fetch_optional(&state.db_pool)
    .await?
    else {
        return Ok(CodeCheck::Missing);
    };
    if row.code.is_empty() {
        return Ok(CodeCheck::Missing);
    }

    if Utc::now() >= parse_time(&row.expires_at)? {
        retire_code(state, phone).await?;
        return Ok(CodeCheck::Expired);
    }

    if row.code == code {
        retire_code(state, phone).await?;
        log::info!("Phone {} verified", phone);
        return Ok(CodeCheck::Valid);
    }

    let attempts = row.attempts + 1;
    let attempts_left = (state.config.otp_max_attempts - attempts).max(0);
    if attempts_left == 0 {
        retire_code(state, phone).await?;
        log::warn!("Verification code for {} burned after {} attempts", phone, attempts);
    } else {
        sqlx::query("UPDATE phone_verifications SET attempts = $1 WHERE phone = $2")
            .bind(attempts)
            .bind(phone)
            .execute(&state.db_pool)
            .await?;
    }
    Ok(CodeCheck::Invalid { attempts_left })
}

async fn retire_code(state: &AppState, phone: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE phone_verifications SET code = '', attempts = $1 WHERE phone = $2")
        .bind(state.config.otp_max_attempts)
        .bind(phone)
        .execute(&state.db_pool)
        .await?;
    Ok(())
}

async fn delete_code(state: &AppState, phone: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM phone_verifications WHERE phone = $1")
        .bind(phone)
        .execute(&state.db_pool)
        .await?;
    Ok(())
}
