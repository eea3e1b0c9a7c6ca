//! Field-level request validation.
//!
//! Request types derive [`validator::Validate`]; [`check`] runs the derived
//! rules and flattens any failure into a sorted list of [`FieldError`]s keyed
//! by the field's wire (camelCase) name.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

/// Indian mobile numbers: optional `+91` (with `-` or space) or leading `0`,
/// then ten digits starting 6-9.
pub static INDIAN_PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\+91[\- ]?|0)?[6-9]\d{9}$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

/// Validates `value`, rejecting the whole value on any violation.
pub fn check<T: Validate>(value: &T) -> Result<(), Vec<FieldError>> {
    value.validate().map_err(|e| field_errors(&e))
}

pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = wire_name(&field.to_string());
            errs.iter().map(move |e| FieldError {
                field: field.clone(),
                code: e.code.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field)),
            })
        })
        .collect();

    out.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.code.cmp(&b.code)));
    out
}

/// `profile_picture_url` -> `profilePictureUrl`
fn wire_name(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name() {
        assert_eq!(wire_name("profile_picture_url"), "profilePictureUrl");
        assert_eq!(wire_name("email"), "email");
        assert_eq!(wire_name("id_token"), "idToken");
    }

    #[test]
    fn test_indian_phone_formats() {
        for ok in ["+91-9999999999", "+91 9876543210", "+919876543210", "09876543210", "6123456789"] {
            assert!(INDIAN_PHONE.is_match(ok), "{ok} should match");
        }
        let bad = [
            "+1-202-555-0123",
            "+44 7911 123456",
            "5123456789",
            "+91-99999",
            "+91\t9876543210",
            "+91\n9876543210",
            "phone",
            "",
        ];
        for bad in bad {
            assert!(!INDIAN_PHONE.is_match(bad), "{bad} should not match");
        }
    }
}
