//! Phone number normalization.
//!
//! Numbers arrive in whatever shape users type them ("+254 712-345 678",
//! "(0712) 345678", a bare JSON number). Everything that is not an ASCII
//! digit is dropped and the remainder must be a plausible E.164 length.

use std::fmt;

use serde_json::Value;

use crate::error::PhoneError;

/// Minimum number of digits accepted.
pub const MIN_DIGITS: usize = 7;

/// Maximum number of digits accepted (E.164 limit).
pub const MAX_DIGITS: usize = 15;

/// Server suffix for personal WhatsApp addresses.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// A validated, digits-only phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Strip non-digits and validate the length.
    pub fn parse(raw: &str) -> Result<Self, PhoneError> {
        if raw.is_empty() {
            return Err(PhoneError::Missing);
        }

        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
            return Err(PhoneError::InvalidLength {
                digits: digits.len(),
            });
        }

        Ok(Self(digits))
    }

    /// Parse the `phone` field of a JSON request body.
    ///
    /// Strings are parsed as-is. Numbers must be non-negative integers and
    /// are rendered first; floats and negatives are rejected. An absent,
    /// null or empty value counts as missing.
    pub fn from_json(value: Option<&Value>) -> Result<Self, PhoneError> {
        match value {
            None | Some(Value::Null) => Err(PhoneError::Missing),
            Some(Value::String(s)) => Self::parse(s),
            Some(Value::Number(n)) => match n.as_u64() {
                Some(n) => Self::parse(&n.to_string()),
                None => Err(PhoneError::UnsupportedType),
            },
            Some(_) => Err(PhoneError::UnsupportedType),
        }
    }

    /// The bare digits.
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// The user's WhatsApp address (`<digits>@s.whatsapp.net`).
    pub fn jid(&self) -> String {
        format!("{}@{}", self.0, USER_SERVER)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}", self.0)
    }
}
