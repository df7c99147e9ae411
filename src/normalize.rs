//! Input normalization
//!
//! Everything here runs before a value is framed as a TLV field. Free text is reduced to
//! uppercase ASCII letters, digits and single spaces, keys are reformatted to the way they
//! are registered in the PIX directory and amounts are re-rendered from their parsed value.
use std::str::FromStr;

use log::debug;
use nom::Finish;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::{
    parser, Amount, Field, PayloadError, PixKey, MAX_AMOUNT_LEN, MAX_TXID_BYTES, NO_TXID,
};

/// Characters, other than digits, allowed in a phone number or tax id as typed by a person
const KEY_PUNCTUATION: &str = " +().-/";

/// Decompose, drop diacritics and anything outside `[A-Za-z0-9 ]`, uppercase and collapse spaces
///
/// Idempotent: normalizing an already normalized value returns it unchanged.
pub fn normalize_text(value: &str) -> String {
    let ascii: String = value
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();

    ascii
        .split_ascii_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Longest prefix of `value` whose UTF-8 encoding fits in `max_bytes`
///
/// Never splits a code point, drops the whole character instead.
pub fn truncate_bytes(value: &str, max_bytes: usize) -> &str {
    let mut end = 0;
    for c in value.chars() {
        let next = end + c.len_utf8();
        if next > max_bytes {
            break;
        }
        end = next;
    }
    &value[..end]
}

/// Why [`classify_key`] picked a [`KeyKind`](crate::KeyKind)
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rationale {
    /// Contains `@`
    AtSign,
    /// 13 digits, `+` prefixed or starting with `55`
    CountryCode,
    /// 11 digits starting with `0`, no area code does
    LeadingZero,
    /// 11 digits written with `.` or `-`
    Punctuation,
    /// 11 digits whose third digit is 7, 8 or 9, like a mobile number after its area code
    MobileDigit,
    /// 11 digits with no other hint
    DefaultTaxId,
    /// 14 digits
    CnpjLength,
    /// None of the above, passed through as is
    Unrecognized,
}

/// Outcome of [`classify_key`]
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Classification {
    pub key: PixKey,
    pub rationale: Rationale,
}

impl Classification {
    /// An 11 digit value may be either a CPF or a mobile number, the guess can be wrong
    ///
    /// When it is, build the right [`PixKey`] explicitly instead.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self.rationale,
            Rationale::Punctuation | Rationale::MobileDigit | Rationale::DefaultTaxId
        )
    }
}

/// Best effort guess of the kind of a raw PIX key
///
/// Some valid CPFs (third digit 7, 8 or 9 with no punctuation) are taken for phone numbers,
/// check [`Classification::is_ambiguous`] and build the [`PixKey`] yourself to override.
///
/// Only values made of digits and ` +().-/` are read as phones or tax ids. Anything else,
/// labelled input such as `CPF: 123.456.789-09` included, is passed through as an
/// [`Evp`](PixKey::Evp) key.
pub fn classify_key(value: &str) -> Classification {
    let value = value.trim();
    let (key, rationale) = guess_key(value);
    debug!("classified pix key as {:?} ({:?})", key.kind(), rationale);
    Classification { key, rationale }
}

fn guess_key(value: &str) -> (PixKey, Rationale) {
    if value.contains('@') {
        return (PixKey::email(value), Rationale::AtSign);
    }

    let numeric = value
        .chars()
        .all(|c| c.is_ascii_digit() || KEY_PUNCTUATION.contains(c));
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if !numeric || digits.is_empty() {
        return (PixKey::evp(value), Rationale::Unrecognized);
    }

    if digits.len() == 13 && (value.starts_with('+') || digits.starts_with("55")) {
        return (PixKey::Phone(format!("+{digits}")), Rationale::CountryCode);
    }

    match digits.len() {
        11 => {
            if digits.starts_with('0') {
                (PixKey::TaxId(digits), Rationale::LeadingZero)
            } else if value.contains(['.', '-']) {
                (PixKey::TaxId(digits), Rationale::Punctuation)
            } else if matches!(digits.as_bytes()[2], b'7' | b'8' | b'9') {
                (PixKey::Phone(format!("+55{digits}")), Rationale::MobileDigit)
            } else {
                (PixKey::TaxId(digits), Rationale::DefaultTaxId)
            }
        }
        14 => (PixKey::TaxId(digits), Rationale::CnpjLength),
        _ => (PixKey::evp(value), Rationale::Unrecognized),
    }
}

/// Parse a decimal amount and round it to cents
///
/// Accepts `.` or `,` as separator. More than 2 decimals are rounded half up.
/// Zero, negative and non numeric input is [`PayloadError::InvalidAmount`].
pub fn normalize_amount(value: &str) -> Result<Amount, PayloadError> {
    let invalid = || PayloadError::InvalidAmount(value.to_string());
    let trimmed = value.trim();

    let (_, (units, decimals)) = parser::amount(trimmed.as_bytes())
        .finish()
        .map_err(|_| invalid())?;

    // Digits after the dot: cents, then the one deciding the rounding
    let decimals = decimals.unwrap_or_default();
    let digit = |i: usize| decimals.get(i).map_or(0, |d| (d - b'0') as u64);
    let fraction = digit(0) * 10 + digit(1) + u64::from(digit(2) >= 5);

    let too_long = || PayloadError::FieldTooLong {
        field: Field::Amount,
        max: MAX_AMOUNT_LEN,
        actual: units.len() + 3,
    };
    let cents = units
        .iter()
        .try_fold(0u64, |acc, d| acc.checked_mul(10)?.checked_add((d - b'0') as u64))
        .and_then(|units| units.checked_mul(100)?.checked_add(fraction))
        .ok_or_else(too_long)?;

    let amount = Amount::from_cents(cents).ok_or_else(invalid)?;
    let rendered = amount.to_string().len();
    if rendered > MAX_AMOUNT_LEN {
        return Err(PayloadError::FieldTooLong {
            field: Field::Amount,
            max: MAX_AMOUNT_LEN,
            actual: rendered,
        });
    }
    Ok(amount)
}

impl FromStr for Amount {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_amount(s)
    }
}

/// Keep the ASCII letters and digits of a transaction id, case preserved
///
/// [`NO_TXID`] is passed through. Rejects instead of truncating when over [`MAX_TXID_BYTES`].
pub fn normalize_txid(value: &str) -> Result<String, PayloadError> {
    let value = value.trim();
    if value == NO_TXID {
        return Ok(value.to_string());
    }

    let txid: String = value
        .nfkd()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    if txid.is_empty() {
        return Err(PayloadError::EmptyAfterNormalization(Field::Txid));
    }
    if txid.len() > MAX_TXID_BYTES {
        return Err(PayloadError::FieldTooLong {
            field: Field::Txid,
            max: MAX_TXID_BYTES,
            actual: txid.len(),
        });
    }
    Ok(txid)
}
