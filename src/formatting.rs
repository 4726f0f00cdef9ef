//! String transforms for the form inputs.
//!
//! Everything here is pure: the page runs the same rules on every change
//! event and the server re-applies them before validation.

use phonenumber::country::Id as CountryId;
use phonenumber::Mode;

/// Largest loan amount the form accepts.
pub const MAX_LOAN_AMOUNT: u64 = 100_000_000;

/// Digits in an Australian mobile number, national format.
pub const PHONE_DIGITS: usize = 10;

/// National prefix of Australian mobile numbers.
pub const AU_MOBILE_PREFIX: &str = "04";

/// Removes every character that is not an ASCII digit.
pub fn strip_non_digits(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalizes a phone number to its digits.
pub fn normalize_phone_number(phone: &str) -> String {
    strip_non_digits(phone)
}

/// Formats a phone number for display.
///
/// Australian numbers are grouped `XXXX XXX XXX` as they are typed; any other
/// country just gets the bare digits.
pub fn format_phone_number(phone: &str, country: &str) -> String {
    let cleaned = strip_non_digits(phone);
    if country != "AU" {
        return cleaned;
    }

    // Only ASCII digits remain, so byte offsets are char offsets.
    match cleaned.len() {
        0..=4 => cleaned,
        5..=7 => format!("{} {}", &cleaned[..4], &cleaned[4..]),
        len => {
            let third_end = len.min(10);
            format!(
                "{} {} {}{}",
                &cleaned[..4],
                &cleaned[4..7],
                &cleaned[7..third_end],
                &cleaned[third_end..]
            )
        }
    }
}

/// Formats an amount for display with thousands separators.
///
/// Non-digits are dropped first, so `"$25000"` and `"25,000"` both render as
/// `"25,000"`. Leading zeros are kept the way they were typed.
pub fn format_amount(value: &str) -> String {
    let digits = strip_non_digits(value);
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    out
}

/// Uppercases the first character and leaves the rest untouched.
pub fn capitalize_first(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Applies an amount change event.
///
/// Returns the digit-only value to store, or `None` when the change must be
/// ignored because the amount would exceed [`MAX_LOAN_AMOUNT`].
pub fn filter_amount_change(input: &str) -> Option<String> {
    let digits = strip_non_digits(input);
    if digits.is_empty() {
        return Some(digits);
    }

    match digits.parse::<u64>() {
        Ok(amount) if amount <= MAX_LOAN_AMOUNT => Some(digits),
        _ => None,
    }
}

/// Applies a phone change event.
///
/// Returns the digit-only value to store, or `None` when the input holds more
/// than [`PHONE_DIGITS`] digits.
pub fn filter_phone_change(input: &str) -> Option<String> {
    let digits = strip_non_digits(input);
    (digits.len() <= PHONE_DIGITS).then_some(digits)
}

/// Converts a national Australian number (`04…`) to E.164 (`+614…`).
///
/// Numbers without a leading trunk zero are returned unchanged.
pub fn to_e164_au(phone: &str) -> String {
    if !phone.starts_with('0') {
        return phone.to_string();
    }

    match phonenumber::parse(Some(CountryId::AU), phone) {
        Ok(number) => number.format().mode(Mode::E164).to_string(),
        Err(e) => {
            tracing::warn!("⚠️  Failed to parse AU phone, using plain +61 prefix: {:?}", e);
            format!("+61{}", &phone[1..])
        }
    }
}
