use crate::error::{AuthError, Result};
use chrono::{Months, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const MINIMUM_AGE_YEARS: u32 = 16;

const RESERVED_FRAGMENTS: [&str; 3] = ["admin", "root", "moderator"];

lazy_static! {
    /// Sign-up format: letters, digits and underscore only.
    static ref SIGN_UP_USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    static ref USERNAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9_\-.]*[A-Za-z0-9])?$").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(length(min = 6, max = 50), regex(path = *SIGN_UP_USERNAME_REGEX))]
    pub username: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 10, max = 20))]
    pub phone: Option<String>,

    #[serde(skip_serializing)]
    #[validate(length(min = 8))]
    pub password: String,

    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
}

impl SignUpRequest {
    /// Field validation plus the structural username rules and age gate.
    /// Returns the parsed date of birth.
    pub fn check(&self, today: NaiveDate) -> Result<Option<NaiveDate>> {
        self.validate()?;
        check_username(&self.username)?;

        match self.date_of_birth.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(raw) => {
                let dob = parse_date_of_birth(raw)?;
                if !is_old_enough(dob, today) {
                    return Err(AuthError::InvalidInput(format!(
                        "You must be at least {} years old to sign up",
                        MINIMUM_AGE_YEARS
                    )));
                }
                Ok(Some(dob))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EmailChange {
    #[validate(email)]
    pub email: String,
}

/// Minimum password length shared by sign-up, reset and change.
pub fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < 8 {
        return Err(AuthError::InvalidInput(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

/// Structural username rules used by availability checks and username
/// changes: 3 to 50 characters, alphanumeric at both ends, no adjacent
/// separators and no reserved words.
pub fn check_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err(AuthError::InvalidInput(
            "Username must be between 3 and 50 characters".to_string(),
        ));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(AuthError::InvalidInput(
            "Username may only contain letters, digits, '_', '-' and '.', and must start and end with a letter or digit".to_string(),
        ));
    }

    let is_separator = |c: char| matches!(c, '_' | '-' | '.');
    let chars: Vec<char> = username.chars().collect();
    if chars.windows(2).any(|w| is_separator(w[0]) && is_separator(w[1])) {
        return Err(AuthError::InvalidInput(
            "Username cannot contain consecutive '_', '-' or '.'".to_string(),
        ));
    }

    let lower = username.to_lowercase();
    if RESERVED_FRAGMENTS.iter().any(|word| lower.contains(word))
        || lower.starts_with("sys_")
        || lower.ends_with("_system")
    {
        return Err(AuthError::InvalidInput("Username is reserved".to_string()));
    }

    Ok(())
}

pub fn parse_date_of_birth(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        AuthError::InvalidInput("Date of birth must be formatted as YYYY-MM-DD".to_string())
    })
}

/// Calendar comparison: old enough on or after the sixteenth birthday.
pub fn is_old_enough(dob: NaiveDate, today: NaiveDate) -> bool {
    match dob.checked_add_months(Months::new(MINIMUM_AGE_YEARS * 12)) {
        Some(birthday) => today >= birthday,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(username: &str) -> SignUpRequest {
        SignUpRequest {
            username: username.to_string(),
            email: "fan@example.com".to_string(),
            phone: Some("+15555550100".to_string()),
            password: "long-enough".to_string(),
            date_of_birth: None,
        }
    }

    #[test]
    fn test_age_gate_boundary() {
        let dob = date(2008, 6, 15);
        assert!(!is_old_enough(dob, date(2024, 6, 14)));
        assert!(is_old_enough(dob, date(2024, 6, 15)));
    }

    #[test]
    fn test_age_gate_leap_day() {
        let dob = date(2008, 2, 29);
        assert!(!is_old_enough(dob, date(2024, 2, 28)));
        assert!(is_old_enough(dob, date(2024, 2, 29)));
    }

    #[test]
    fn test_username_rules() {
        assert!(check_username("jane.doe-99").is_ok());
        assert!(check_username("ab").is_err());
        assert!(check_username("_jane").is_err());
        assert!(check_username("jane_").is_err());
        assert!(check_username("jane__doe").is_err());
        assert!(check_username("jane.-doe").is_err());
        assert!(check_username("SuperAdmin1").is_err());
        assert!(check_username("groot42").is_err());
        assert!(check_username("sys_tickets").is_err());
        assert!(check_username("tickets_system").is_err());
        assert!(check_username(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_sign_up_username_format() {
        let today = date(2025, 1, 1);
        assert!(request("event_fan").check(today).is_ok());
        assert!(request("fan").check(today).is_err());
        assert!(request("event.fan").check(today).is_err());
        assert!(request("event__fan").check(today).is_err());
    }

    #[test]
    fn test_sign_up_age_and_format() {
        let today = date(2025, 1, 1);
        let mut req = request("event_fan");

        req.date_of_birth = Some("2010-01-02".to_string());
        assert!(matches!(req.check(today), Err(AuthError::InvalidInput(_))));

        req.date_of_birth = Some("01/02/2000".to_string());
        assert!(req.check(today).is_err());

        req.date_of_birth = Some("2000-01-02".to_string());
        assert_eq!(req.check(today).unwrap(), Some(date(2000, 1, 2)));
    }

    #[test]
    fn test_sign_up_field_validation() {
        let today = date(2025, 1, 1);
        let mut req = request("event_fan");
        req.password = "short".to_string();
        assert!(req.check(today).is_err());

        let mut req = request("event_fan");
        req.email = "not-an-email".to_string();
        assert!(req.check(today).is_err());

        let mut req = request("event_fan");
        req.phone = Some("123".to_string());
        assert!(req.check(today).is_err());
    }
}
