//! Input checks run before credentials leave the client

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ApiError;
use crate::profile::Registration;
use crate::Result;

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static AADHAAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{12}$").expect("valid aadhaar regex"));
static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10}$").expect("valid phone regex"));

pub fn validate_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

/// Twelve digits; spaces between groups are allowed.
pub fn validate_aadhaar(aadhaar: &str) -> bool {
    let compact: String = aadhaar.chars().filter(|c| !c.is_whitespace()).collect();
    AADHAAR.is_match(&compact)
}

/// Ten digits once punctuation and country formatting are stripped.
pub fn validate_phone(phone: &str) -> bool {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    PHONE.is_match(&digits)
}

/// Login accepts either an email address or an Aadhaar number.
pub fn validate_identifier(identifier: &str) -> bool {
    validate_email(identifier) || validate_aadhaar(identifier)
}

pub fn validate_credentials(identifier: &str, password: &str) -> Result<()> {
    let mut problems = Vec::new();

    if !validate_identifier(identifier.trim()) {
        problems.push("identifier: Enter a valid email address or 12-digit Aadhaar number");
    }
    if !validate_password(password) {
        problems.push("password: Password must be at least 6 characters long");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(problems.join("; ")))
    }
}

/// Sign-up checks, in the order the form shows them.
pub fn validate_registration(registration: &Registration) -> Result<()> {
    let mut problems = Vec::new();

    if registration.full_name.trim().is_empty() {
        problems.push("full_name: Full name is required");
    }
    if !validate_email(registration.email.trim()) {
        problems.push("email: Please enter a valid email address");
    }
    if !validate_password(&registration.password) {
        problems.push("password: Password must be at least 6 characters long");
    }
    if !validate_aadhaar(&registration.aadhaar) {
        problems.push("aadhaar: Please enter a valid 12-digit Aadhaar number");
    }
    if !validate_phone(&registration.phone) {
        problems.push("phone: Please enter a valid 10-digit phone number");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(problems.join("; ")))
    }
}
