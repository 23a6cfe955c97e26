//! Form validation.
//!
//! Each validator checks every field and reports all failures together in
//! one field → message map, so a form can mark every bad field at once.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const MIN_MODEL_YEAR: u16 = 1980;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_MILEAGE: u32 = 999_999;

/// Field name → first error message for that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error. The first message for a field wins.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

// ---------------------------------------------------------------------------
// Field rules
// ---------------------------------------------------------------------------

fn require(errors: &mut ValidationErrors, field: &str, value: &str, label: &str) -> bool {
    if value.trim().is_empty() {
        errors.add(field, format!("{label} is required"));
        false
    } else {
        true
    }
}

/// 17 characters, letters and digits, never I, O or Q.
pub fn is_valid_vin(vin: &str) -> bool {
    vin.len() == 17
        && vin
            .chars()
            .all(|c| c.is_ascii_alphanumeric() && !matches!(c.to_ascii_uppercase(), 'I' | 'O' | 'Q'))
}

pub fn is_valid_zip(zip: &str) -> bool {
    zip.len() == 5 && zip.chars().all(|c| c.is_ascii_digit())
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.contains(char::is_whitespace)
        && !domain.contains('@')
        && domain
            .split_once('.')
            .map(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
            .unwrap_or(false)
}

/// US numbers: ten digits once punctuation is stripped, or eleven with a
/// leading 1.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.' | '+'));
    if !allowed {
        return None;
    }
    match digits.len() {
        10 => Some(digits),
        11 if digits.starts_with('1') => Some(digits[1..].to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Forms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuctionListingForm {
    pub vin: String,
    pub year: u16,
    pub make: String,
    pub model: String,
    pub mileage: u32,
    pub zip_code: String,
    pub reserve_price: Decimal,
    #[serde(default)]
    pub condition: Option<String>,
}

impl AuctionListingForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_at(Utc::now())
    }

    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if require(&mut errors, "vin", &self.vin, "VIN") && !is_valid_vin(self.vin.trim()) {
            errors.add("vin", "VIN must be 17 letters or digits, excluding I, O and Q");
        }

        let max_year = now.year() as u16 + 1;
        if self.year < MIN_MODEL_YEAR || self.year > max_year {
            errors.add("year", format!("Year must be between {MIN_MODEL_YEAR} and {max_year}"));
        }

        require(&mut errors, "make", &self.make, "Make");
        require(&mut errors, "model", &self.model, "Model");

        if self.mileage > MAX_MILEAGE {
            errors.add("mileage", "Mileage looks too high");
        }

        if require(&mut errors, "zip_code", &self.zip_code, "ZIP code") && !is_valid_zip(self.zip_code.trim()) {
            errors.add("zip_code", "ZIP code must be 5 digits");
        }

        if self.reserve_price <= Decimal::ZERO {
            errors.add("reserve_price", "Reserve price must be greater than zero");
        }

        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
    pub zip_code: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        require(&mut errors, "first_name", &self.first_name, "First name");
        require(&mut errors, "last_name", &self.last_name, "Last name");

        if require(&mut errors, "email", &self.email, "Email") && !is_valid_email(&self.email) {
            errors.add("email", "Enter a valid email address");
        }

        if require(&mut errors, "phone", &self.phone, "Phone") && normalize_phone(&self.phone).is_none() {
            errors.add("phone", "Phone must be a 10-digit number");
        }

        if self.password.len() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
            );
        } else if !self.password.chars().any(|c| c.is_ascii_digit()) {
            errors.add("password", "Password must contain a number");
        }

        if self.confirm_password != self.password {
            errors.add("confirm_password", "Passwords do not match");
        }

        if require(&mut errors, "zip_code", &self.zip_code, "ZIP code") && !is_valid_zip(self.zip_code.trim()) {
            errors.add("zip_code", "ZIP code must be 5 digits");
        }

        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentForm {
    pub dealer_id: String,
    pub preferred_at: Option<DateTime<Utc>>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AppointmentForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_at(Utc::now())
    }

    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        require(&mut errors, "dealer_id", &self.dealer_id, "Dealer");

        match self.preferred_at {
            None => errors.add("preferred_at", "Pick a date and time"),
            Some(at) if at <= now => errors.add("preferred_at", "Appointment must be in the future"),
            Some(_) => {}
        }

        require(&mut errors, "contact_name", &self.contact_name, "Name");

        // Either channel is enough, but whatever is given must be valid.
        let email = self.contact_email.trim();
        let phone = self.contact_phone.trim();
        if email.is_empty() && phone.is_empty() {
            errors.add("contact_email", "Provide an email or phone number");
        }
        if !email.is_empty() && !is_valid_email(email) {
            errors.add("contact_email", "Enter a valid email address");
        }
        if !phone.is_empty() && normalize_phone(phone).is_none() {
            errors.add("contact_phone", "Phone must be a 10-digit number");
        }

        errors.into_result()
    }
}
