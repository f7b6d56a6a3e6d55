//! Input normalization for charge requests.
//!
//! Amounts become exact cents rendered with two decimals; transaction ids
//! become `TX_` followed by at most 31 ASCII alphanumerics, which keeps them
//! inside the provider's 35 character limit.

use std::fmt;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::types::RawAmount;

pub const TXID_PREFIX: &str = "TX_";
pub const TXID_MAX_LEN: usize = 35;
const TXID_BODY_MAX_LEN: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A non-negative amount of money held as integer cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount {
    cents: i64,
}

impl Amount {
    pub const ZERO: Self = Self { cents: 0 };

    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn cents(self) -> i64 {
        self.cents
    }

    pub fn is_zero(self) -> bool {
        self.cents == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.cents.checked_add(other.cents).map(Self::from_cents)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

pub fn normalize_amount(raw: &RawAmount) -> Result<Amount, ValidationError> {
    let text = match raw {
        RawAmount::Number(value) => {
            if !value.is_finite() {
                return Err(ValidationError::new("amount must be a finite number"));
            }
            value.to_string()
        }
        RawAmount::Text(value) => value.trim().replace(',', "."),
    };

    parse_decimal(&text)
}

/// Accepts exactly `^\d+(\.\d{1,2})?$`.
fn parse_decimal(text: &str) -> Result<Amount, ValidationError> {
    let invalid = || ValidationError::new(format!("invalid amount: {text:?}"));

    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let fraction_cents = match fraction {
        None => 0,
        Some(digits)
            if (1..=2).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let value: i64 = digits.parse().map_err(|_| invalid())?;
            if digits.len() == 1 { value * 10 } else { value }
        }
        Some(_) => return Err(invalid()),
    };

    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    whole
        .checked_mul(100)
        .and_then(|cents| cents.checked_add(fraction_cents))
        .map(Amount::from_cents)
        .ok_or_else(invalid)
}

/// Derives a provider transaction id from a caller hint, or from the clock
/// when the hint has no usable characters.
///
/// Re-normalizing an already normalized id returns it unchanged.
pub fn normalize_txid(hint: Option<&str>) -> String {
    let raw = hint.map(str::trim).unwrap_or_default();
    let raw = raw.strip_prefix(TXID_PREFIX).unwrap_or(raw);

    let body: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(TXID_BODY_MAX_LEN)
        .collect();

    if body.is_empty() {
        format!("{TXID_PREFIX}{}", timestamp_body())
    } else {
        format!("{TXID_PREFIX}{body}")
    }
}

fn timestamp_body() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{millis}{suffix}")
}
