use std::env;

use actix_web::cookie::Key;

use crate::errors::AppError;

/// Runtime settings, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub session_key: Vec<u8>,
    pub otp_ttl_secs: i64,
    pub otp_max_attempts: i64,
    pub otp_resend_cooldown_secs: i64,
    pub sms_gateway_url: Option<String>,
    pub sms_gateway_token: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let session_key = env::var("SESSION_KEY")?.into_bytes();
        if session_key.len() < 64 {
            return Err(AppError::ConfigError(
                "SESSION_KEY must be at least 64 bytes".to_string(),
            ));
        }

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://shibr.db".to_string()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_or("SERVER_PORT", 8080),
            session_key,
            otp_ttl_secs: parse_or("OTP_TTL_SECS", 300),
            otp_max_attempts: parse_or("OTP_MAX_ATTEMPTS", 5),
            otp_resend_cooldown_secs: parse_or("OTP_RESEND_COOLDOWN_SECS", 60),
            sms_gateway_url: env::var("SMS_GATEWAY_URL").ok().filter(|s| !s.is_empty()),
            sms_gateway_token: env::var("SMS_GATEWAY_TOKEN").ok().filter(|s| !s.is_empty()),
            admin_email: env::var("ADMIN_EMAIL").ok().filter(|s| !s.is_empty()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
        })
    }

    pub fn server_addr(&self) -> (String, u16) {
        (self.server_host.clone(), self.server_port)
    }

    pub fn cookie_key(&self) -> Key {
        Key::from(&self.session_key)
    }

    /// Settings for tests: in-memory database, no gateway.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            session_key: vec![7u8; 64],
            otp_ttl_secs: 300,
            otp_max_attempts: 5,
            otp_resend_cooldown_secs: 60,
            sms_gateway_url: None,
            sms_gateway_token: None,
            admin_email: None,
            admin_password: None,
        }
    }
}
