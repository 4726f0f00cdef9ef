//! Field validation for the lead form.
//!
//! Rules are evaluated synchronously, per field or for the whole form, and
//! report one message per failing field. Nothing here panics or errors out to
//! the caller; a failing field is data.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::formatting::{
    capitalize_first, filter_amount_change, filter_phone_change, strip_non_digits,
    AU_MOBILE_PREFIX, MAX_LOAN_AMOUNT, PHONE_DIGITS,
};

pub const FNAME_TOO_SHORT: &str = "First name must be at least 2 characters";
pub const LNAME_TOO_SHORT: &str = "Last name must be at least 2 characters";
pub const EMAIL_INVALID: &str = "Please enter a valid email address";
pub const PHONE_TOO_SHORT: &str = "Phone number must be at least 10 digits";
pub const PHONE_NOT_MOBILE: &str = "Please enter a valid mobile number";
pub const PHONE_NOT_AU: &str = "Must be an Australian Mobile";
pub const AMOUNT_MISSING: &str = "Please enter a loan amount";
pub const AMOUNT_OUT_OF_RANGE: &str = "Loan amount must be between $1 and $100,000,000";

const MIN_NAME_CHARS: usize = 2;

/// Form fields, named as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Fname,
    Lname,
    Email,
    Phone,
    Amount,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Fname,
        Field::Lname,
        Field::Email,
        Field::Phone,
        Field::Amount,
    ];
}

/// Field-scoped validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(field, msg)| (*field, msg.as_str()))
    }
}

/// Raw form input as typed (or as posted by the page).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LeadForm {
    #[serde(default)]
    pub fname: String,
    #[serde(default)]
    pub lname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub amount: String,
}

/// A lead whose every field passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLead {
    pub fname: String,
    pub lname: String,
    pub email: String,
    /// National format, digits only (`04XXXXXXXX`).
    pub phone: String,
    pub amount: u64,
}

impl LeadForm {
    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Fname => &self.fname,
            Field::Lname => &self.lname,
            Field::Email => &self.email,
            Field::Phone => &self.phone,
            Field::Amount => &self.amount,
        }
    }

    /// Applies a change event to a field, the way the inputs do.
    ///
    /// Names get their first character capitalised. Amount and phone keep
    /// digits only and ignore the change when it would overflow; in that case
    /// `false` is returned and the stored value is untouched.
    pub fn apply_change(&mut self, field: Field, input: &str) -> bool {
        match field {
            Field::Fname => self.fname = capitalize_first(input),
            Field::Lname => self.lname = capitalize_first(input),
            Field::Email => self.email = input.to_string(),
            Field::Phone => match filter_phone_change(input) {
                Some(digits) => self.phone = digits,
                None => return false,
            },
            Field::Amount => match filter_amount_change(input) {
                Some(digits) => self.amount = digits,
                None => return false,
            },
        }
        true
    }

    /// Validates every field, collecting all failures.
    pub fn validate(&self) -> Result<ValidatedLead, FieldErrors> {
        let mut errors = FieldErrors::default();
        for field in Field::ALL {
            if let Err(message) = validate_field(field, self.value(field)) {
                errors.insert(field, message);
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedLead {
            fname: capitalize_first(&self.fname),
            lname: capitalize_first(&self.lname),
            email: self.email.clone(),
            phone: strip_non_digits(&self.phone),
            amount: parse_amount(&self.amount).unwrap_or_default(),
        })
    }
}

/// Validates a single field value, returning the first failing rule's message.
pub fn validate_field(field: Field, value: &str) -> Result<(), &'static str> {
    match field {
        Field::Fname => check_name(value, FNAME_TOO_SHORT),
        Field::Lname => check_name(value, LNAME_TOO_SHORT),
        Field::Email => {
            if is_valid_email(value) {
                Ok(())
            } else {
                Err(EMAIL_INVALID)
            }
        }
        Field::Phone => check_phone(value),
        Field::Amount => check_amount(value),
    }
}

fn check_name(value: &str, message: &'static str) -> Result<(), &'static str> {
    if value.chars().count() < MIN_NAME_CHARS {
        return Err(message);
    }
    Ok(())
}

fn check_phone(value: &str) -> Result<(), &'static str> {
    if value.chars().count() < PHONE_DIGITS {
        return Err(PHONE_TOO_SHORT);
    }
    let digits = strip_non_digits(value);
    if digits.len() != PHONE_DIGITS {
        return Err(PHONE_NOT_MOBILE);
    }
    if !digits.starts_with(AU_MOBILE_PREFIX) {
        return Err(PHONE_NOT_AU);
    }
    Ok(())
}

fn check_amount(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err(AMOUNT_MISSING);
    }
    match parse_amount(value) {
        Some(amount) if (1..=MAX_LOAN_AMOUNT).contains(&amount) => Ok(()),
        _ => Err(AMOUNT_OUT_OF_RANGE),
    }
}

/// Parses the digits of an amount. `None` when there are no digits or the
/// number does not fit in a `u64`.
pub fn parse_amount(value: &str) -> Option<u64> {
    strip_non_digits(value).parse().ok()
}

/// Checks that an email address is syntactically valid.
///
/// Local part: letters, digits and `_ ' + - .`, not starting with a dot, no
/// consecutive dots, not ending with `'` or `.`. Domain: dot-separated labels
/// with an alphabetic TLD of at least two letters.
pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL_RE.get_or_init(|| {
        Regex::new(r"(?i)^[A-Z0-9_'+\-.]*[A-Z0-9_+\-]@(?:[A-Z0-9][A-Z0-9\-]*\.)+[A-Z]{2,}$")
            .expect("email regex is valid")
    });

    !email.starts_with('.') && !email.contains("..") && re.is_match(email)
}
