use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_DISPLAY_NAME_CHARS: usize = 40;
pub const MAX_HANDLE_CHARS: usize = 30;
pub const MAX_POST_CHARS: usize = 140;
pub const MAX_REPORT_REASON_CHARS: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least 8 characters")]
    PasswordTooShort,
    #[error("display name is required")]
    DisplayNameEmpty,
    #[error("display name must be at most 40 characters")]
    DisplayNameTooLong,
    #[error("post body is required")]
    PostEmpty,
    #[error("post body must be at most 140 characters")]
    PostTooLong,
    #[error("report reason must be at most 500 characters")]
    ReasonTooLong,
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidEmail => "email",
            ValidationError::PasswordTooShort => "password",
            ValidationError::DisplayNameEmpty | ValidationError::DisplayNameTooLong => {
                "display_name"
            }
            ValidationError::PostEmpty | ValidationError::PostTooLong => "body",
            ValidationError::ReasonTooLong => "reason",
        }
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9-]+(\.[a-z0-9-]+)*\.[a-z]{2,}$").expect("email regex")
    })
}

/// Returns the canonical (trimmed, lowercased) address.
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    if !email_regex().is_match(&email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

pub fn normalize_display_name(display_name: &str) -> Result<String, ValidationError> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(ValidationError::DisplayNameEmpty);
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(ValidationError::DisplayNameTooLong);
    }
    Ok(display_name.to_string())
}

/// `"Jane Doe"` becomes `"jane_doe"`, capped at the handle length.
pub fn derive_handle(display_name: &str) -> String {
    display_name
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .take(MAX_HANDLE_CHARS)
        .collect()
}

/// Handle used when the derived one is taken: the base shortened to leave room
/// for `_` plus the suffix.
pub fn handle_with_suffix(base: &str, suffix: &str) -> String {
    let keep = MAX_HANDLE_CHARS.saturating_sub(suffix.chars().count() + 1);
    let prefix: String = base.chars().take(keep).collect();
    format!("{prefix}_{suffix}")
}

pub fn validate_post_body(body: &str) -> Result<(), ValidationError> {
    if body.trim().is_empty() {
        return Err(ValidationError::PostEmpty);
    }
    if body.chars().count() > MAX_POST_CHARS {
        return Err(ValidationError::PostTooLong);
    }
    Ok(())
}

pub fn normalize_report_reason(reason: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(reason) = reason.map(str::trim).filter(|reason| !reason.is_empty()) else {
        return Ok(None);
    };
    if reason.chars().count() > MAX_REPORT_REASON_CHARS {
        return Err(ValidationError::ReasonTooLong);
    }
    Ok(Some(reason.to_string()))
}
