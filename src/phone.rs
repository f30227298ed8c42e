//! Phone number normalization and area-code extraction
//!
//! All numbers are handled as canonical digit strings. Area codes follow the
//! North American convention: the first three digits of a 10-digit number,
//! with a leading `1` stripped from 11-digit numbers first.

use crate::error::{AllocationError, Result};

/// Minimum digits for a dialable destination
pub const MIN_DESTINATION_DIGITS: usize = 7;

/// Maximum digits for any number we handle
pub const MAX_NUMBER_DIGITS: usize = 15;

/// Minimum digits for a pool caller ID
pub const MIN_CALLER_ID_DIGITS: usize = 10;

/// Strip everything but digits
pub fn sanitize_number(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize a destination number, rejecting anything outside 7-15 digits
pub fn normalize_destination(raw: &str) -> Result<String> {
    let digits = sanitize_number(raw);
    if digits.len() < MIN_DESTINATION_DIGITS || digits.len() > MAX_NUMBER_DIGITS {
        return Err(AllocationError::invalid_destination(format!(
            "destination must be {}-{} digits, got {}",
            MIN_DESTINATION_DIGITS,
            MAX_NUMBER_DIGITS,
            digits.len()
        )));
    }
    Ok(digits)
}

/// Normalize a pool caller ID, rejecting anything outside 10-15 digits
pub fn normalize_caller_id(raw: &str) -> Result<String> {
    let digits = sanitize_number(raw);
    if digits.len() < MIN_CALLER_ID_DIGITS || digits.len() > MAX_NUMBER_DIGITS {
        return Err(AllocationError::invalid_input(format!(
            "caller ID must be {}-{} digits, got {}",
            MIN_CALLER_ID_DIGITS,
            MAX_NUMBER_DIGITS,
            digits.len()
        )));
    }
    Ok(digits)
}

/// Extract the geographic area code from a normalized digit string.
///
/// Returns the first three digits for a 10-digit number, or for an 11-digit
/// number starting with `1` after stripping the leading `1`. Anything else
/// has no area code.
pub fn extract_area_code(digits: &str) -> Option<String> {
    match digits.len() {
        10 => Some(digits[..3].to_string()),
        11 if digits.starts_with('1') => Some(digits[1..4].to_string()),
        _ => None,
    }
}
