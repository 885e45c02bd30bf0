//! Money and date helpers shared by the index, the matcher and the model.
//!
//! All arithmetic happens in integer cents. Vendor exports carry amounts as
//! currency strings (`$1,234.56`) and dates as `MM/DD/YY`; the ledger carries
//! decimal amounts and ISO dates.

use chrono::NaiveDate;

const CURRENCY_SYMBOLS: [char; 3] = ['$', '€', '£'];

/// Parse a currency string into cents.
///
/// Accepts an optional sign on either side of the currency symbol, thousands
/// separators, and any number of fractional digits (rounded half away from
/// zero to cents). Returns `None` for empty or non-numeric input.
pub fn parse_cents(input: &str) -> Option<i64> {
    let mut s = input.trim();
    let mut negative = false;

    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    s = s.trim_start_matches(CURRENCY_SYMBOLS).trim_start();
    if let Some(rest) = s.strip_prefix('-') {
        if negative {
            return None;
        }
        negative = true;
        s = rest;
    }

    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    let (int_part, frac_part) = match cleaned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (cleaned.as_str(), ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let digits: Vec<i64> = frac_part.bytes().map(|b| i64::from(b - b'0')).collect();
    let tenths = digits.first().copied().unwrap_or(0);
    let hundredths = digits.get(1).copied().unwrap_or(0);
    let round_up = digits.get(2).is_some_and(|d| *d >= 5);

    let mut cents = whole.checked_mul(100)?.checked_add(tenths * 10 + hundredths)?;
    if round_up {
        cents = cents.checked_add(1)?;
    }
    Some(if negative { -cents } else { cents })
}

/// Format cents as a currency string: `$42.50`, `-$3.18`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

/// Format cents as a plain decimal: `-42.50`.
pub fn format_decimal(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parse a purchase-export date (`MM/DD/YY`, `MM/DD/YYYY` or ISO).
pub fn parse_purchase_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    let fmt = match s.rsplit_once('/') {
        // `%Y` would read "03/05/20" as year 20.
        Some((_, year)) if year.len() == 2 => "%m/%d/%y",
        Some(_) => "%m/%d/%Y",
        None => "%Y-%m-%d",
    };
    NaiveDate::parse_from_str(s, fmt).ok()
}

/// Serde adapter for a signed cent amount written as a decimal.
///
/// Serializes as a string (`"-42.50"`); deserializes from a JSON number or a
/// currency string.
pub mod decimal {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(cents: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_decimal(*cents))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        deserializer.deserialize_any(CentsVisitor)
    }

    /// For optional fields; pair with `#[serde(default)]`.
    pub fn deserialize_option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        deserialize(deserializer).map(Some)
    }

    struct CentsVisitor;

    impl<'de> Visitor<'de> for CentsVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a decimal amount as a number or string")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            v.checked_mul(100).ok_or_else(|| E::custom("amount out of range"))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v)
                .ok()
                .and_then(|v| v.checked_mul(100))
                .ok_or_else(|| E::custom("amount out of range"))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if !v.is_finite() {
                return Err(E::custom("amount is not finite"));
            }
            let cents = (v * 100.0).round();
            // Stay clear of i64::MIN so callers can take the absolute value.
            if cents.abs() >= i64::MAX as f64 {
                return Err(E::custom("amount out of range"));
            }
            Ok(cents as i64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            super::parse_cents(v).ok_or_else(|| E::custom(format!("cannot parse amount '{v}'")))
        }
    }
}
