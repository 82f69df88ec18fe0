use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use regex::Regex;
use rust_decimal::Decimal;

use crate::errors::AppError;

lazy_static! {
    static ref LOCAL_MOBILE: Regex = Regex::new(r"^(?:\+?966|0)?(5\d{8})$").unwrap();
    static ref OTP_CODE: Regex = Regex::new(r"^\d{6}$").unwrap();
}

const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;':\",.<>?/";

pub fn now_string() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Argon2::default()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
        .map(|hash| hash.to_string())
        .map_err(|e| {
            log::error!("Failed to hash password: {}", e);
            AppError::PasswordError(e.to_string())
        })
}

pub fn verify_password(provided: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        log::error!("Stored password hash is malformed: {}", e);
        AppError::PasswordError(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(provided.as_bytes(), &parsed)
        .is_ok())
}

/// Length 12..=128, with a digit, a letter and a special character.
pub fn validate_password_strength(password: &str) -> Result<(), AppError> {
    let length = password.chars().count();
    if length < 12 {
        return Err(AppError::Validation(
            "Password must be at least 12 characters long".to_string(),
        ));
    }
    if length > 128 {
        return Err(AppError::Validation(
            "Password must be at most 128 characters long".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit())
        || !password.chars().any(|c| c.is_alphabetic())
        || !password.chars().any(|c| SPECIAL_CHARS.contains(c))
    {
        return Err(AppError::Validation(
            "Password must contain at least one number, one letter and one special character"
                .to_string(),
        ));
    }
    Ok(())
}

/// Accepts `05XXXXXXXX`, `5XXXXXXXX`, `9665XXXXXXXX` and `+9665XXXXXXXX`
/// (spaces and dashes ignored) and returns the `+9665XXXXXXXX` form.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    LOCAL_MOBILE
        .captures(&compact)
        .map(|caps| format!("+966{}", &caps[1]))
}

pub fn is_valid_otp_code(code: &str) -> bool {
    OTP_CODE.is_match(code)
}

pub fn parse_money(raw: &str) -> Result<Decimal, AppError> {
    let value: Decimal = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("'{}' is not a valid amount", raw)))?;
    if value.is_sign_negative() {
        return Err(AppError::Validation("Amounts cannot be negative".to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalizes_local_phone_formats() {
        for raw in ["0512345678", "512345678", "966512345678", "+966512345678", "051 234-5678"] {
            assert_eq!(normalize_phone(raw).as_deref(), Some("+966512345678"), "{raw}");
        }
    }

    #[test]
    fn rejects_non_mobile_numbers() {
        for raw in ["", "0412345678", "05123456", "05123456789", "+14155550100", "05abcdefgh"] {
            assert!(normalize_phone(raw).is_none(), "{raw}");
        }
    }

    #[test]
    fn otp_code_is_six_digits() {
        assert!(is_valid_otp_code("004512"));
        assert!(!is_valid_otp_code("12345"));
        assert!(!is_valid_otp_code("1234567"));
        assert!(!is_valid_otp_code("12a456"));
    }

    #[test]
    fn password_strength_rules() {
        assert!(validate_password_strength("short1!").is_err());
        assert!(validate_password_strength("nodigitsatall!!").is_err());
        assert!(validate_password_strength("n0specialchars").is_err());
        assert!(validate_password_strength("correct-horse-7").is_ok());
    }

    #[test]
    fn password_length_counts_characters() {
        // 8 characters, 14 bytes
        assert!(validate_password_strength("كلمةسر1!").is_err());
        let long = format!("{}1!", "س".repeat(100));
        assert!(validate_password_strength(&long).is_ok());
        let too_long = format!("{}1!", "س".repeat(127));
        assert!(validate_password_strength(&too_long).is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct-horse-7").unwrap();
        assert!(verify_password("correct-horse-7", &hash).unwrap());
        assert!(!verify_password("wrong-horse-7", &hash).unwrap());
    }

    #[test]
    fn money_parsing() {
        assert_eq!(parse_money("12.50").unwrap(), dec!(12.50));
        assert!(parse_money("-1").is_err());
        assert!(parse_money("ten").is_err());
    }
}
