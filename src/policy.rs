//! Stateless input validators shared by the account procedures.
//! These run before any store access so malformed input never reaches the
//! persistence layer.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};

/// Characters accepted as the "special" class by the strength rule.
pub const SPECIAL_CHARS: &str = "@$!%*?&";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    // local-part '@' domain, domain must contain a dot; no whitespace anywhere
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap()
});

/// Validate a display name: required, non-empty after trimming.
pub fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::invalid("name_required", "Name is required"));
    }
    Ok(())
}

/// Validate email shape: non-empty local part, '@', domain containing a '.'.
pub fn validate_email(email: &str) -> AppResult<()> {
    if !EMAIL_RE.is_match(email) {
        return Err(AppError::invalid("invalid_email", "Invalid email format"));
    }
    Ok(())
}

/// Validate password strength: at least 8 characters with at least one
/// lowercase letter, one uppercase letter, one digit and one of `@$!%*?&`.
/// Applied uniformly wherever a password is set; there is no weaker policy.
pub fn validate_password_strength(password: &str) -> AppResult<()> {
    if password.chars().count() < 8 {
        return Err(AppError::invalid(
            "weak_password",
            "Password must be at least 8 characters",
        ));
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARS.contains(c));
    if !(has_lower && has_upper && has_digit && has_special) {
        return Err(AppError::invalid(
            "weak_password",
            "Password must contain uppercase, lowercase, number, and special character",
        ));
    }
    Ok(())
}
