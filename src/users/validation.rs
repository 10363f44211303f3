use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::repo_types::User;
use crate::errors::FieldError;

pub const MIN_PASSWORD_LEN: usize = 7;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").unwrap();
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Local part, then a domain of at least two non-empty labels.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn string_value(field: &'static str, value: &Value) -> Result<String, FieldError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| FieldError::new(field, "must be a string"))
}

/// Whole numbers only; `30.0` is accepted, `30.5` and `"30"` are not.
pub fn age_value(value: &Value) -> Result<i32, FieldError> {
    let whole = value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    });
    let Some(raw) = whole else {
        return Err(FieldError::new("age", "must be an integer"));
    };
    i32::try_from(raw).map_err(|_| FieldError::new("age", "is out of range"))
}

/// Trims name, email and any pending password in place.
pub fn normalize(user: &mut User) {
    user.name = user.name.trim().to_string();
    user.email = normalize_email(&user.email);
    if let Some(plain) = user.pending_password.as_mut() {
        *plain = plain.trim().to_string();
    }
}

pub fn password_problem(plain: &str) -> Option<String> {
    if plain.chars().count() < MIN_PASSWORD_LEN {
        return Some(format!("must be at least {MIN_PASSWORD_LEN} characters"));
    }
    if plain.to_lowercase().contains("password") {
        return Some("cannot contain 'password'".into());
    }
    None
}

/// Every field-level problem of an already normalized record.
pub fn check(user: &User) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if user.name.is_empty() {
        errors.push(FieldError::new("name", "is required"));
    }
    if user.email.is_empty() {
        errors.push(FieldError::new("email", "is required"));
    } else if !is_valid_email(&user.email) {
        errors.push(FieldError::new("email", "is invalid"));
    }
    match user.pending_password.as_deref() {
        Some(plain) => {
            if let Some(reason) = password_problem(plain) {
                errors.push(FieldError::new("password", reason));
            }
        }
        None if user.password_hash.is_empty() => {
            errors.push(FieldError::new("password", "is required"));
        }
        None => {}
    }
    if user.age < 0 {
        errors.push(FieldError::new("age", "must be a positive number"));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(errors: &[FieldError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.field).collect()
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        let mut user = User::new("  Ada ", " ADA@X.com ", "  supersecret1  ");
        normalize(&mut user);
        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "ada@x.com");
        assert_eq!(user.pending_password.as_deref(), Some("supersecret1"));
    }

    #[test]
    fn password_with_the_word_password_is_rejected_in_any_case() {
        for pw in ["password123", "myPassWord!", "xxPASSWORDxx"] {
            assert!(password_problem(pw).is_some(), "{pw} accepted");
        }
        assert!(password_problem("supersecret1").is_none());
        assert!(password_problem("short").is_some());
    }

    #[test]
    fn check_collects_every_problem() {
        let mut user = User::new("", "not-an-email", "Password1");
        user.age = -3;
        assert_eq!(fields(&check(&user)), vec!["name", "email", "password", "age"]);
    }

    #[test]
    fn stored_hash_without_pending_password_is_fine() {
        let mut user = User::new("Ada", "ada@x.com", "supersecret1");
        user.pending_password = None;
        assert_eq!(fields(&check(&user)), vec!["password"]);
        user.password_hash = "$argon2id$...".into();
        assert!(check(&user).is_empty());
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("ada@x.com"));
        assert!(!is_valid_email("ada@x"));
        assert!(!is_valid_email("a da@x.com"));
        assert!(!is_valid_email("@x.com"));
        for empty_label in ["ada@x..com", "ada@.x.com", "ada@x.com.", "ada@x."] {
            assert!(!is_valid_email(empty_label), "{empty_label} accepted");
        }
        assert!(is_valid_email("ada@mail.x.co.uk"));
    }

    #[test]
    fn age_accepts_whole_numbers_only() {
        assert_eq!(age_value(&serde_json::json!(30)), Ok(30));
        assert_eq!(age_value(&serde_json::json!(30.0)), Ok(30));
        for bad in [serde_json::json!("ten"), serde_json::json!(30.5), serde_json::json!(true)] {
            assert_eq!(age_value(&bad).unwrap_err().field, "age");
        }
        assert!(age_value(&serde_json::json!(1_i64 << 40)).is_err());
    }
}
