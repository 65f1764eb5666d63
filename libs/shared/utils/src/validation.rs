use std::sync::OnceLock;

use regex::Regex;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
    })
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?[0-9 ()-]{7,20}$").expect("valid phone regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone_regex().is_match(phone.trim())
}

/// Rejects blank required text fields.
pub fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}
