use std::fmt;

use nom::{combinator::all_consuming, Finish};

use crate::parser::payload;

/// Globally Unique Identifier of the PIX arrangement inside the Merchant Account Information
pub const GUI: &str = "BR.GOV.BCB.PIX";

/// Largest value a 2 digit TLV length can describe
pub const MAX_VALUE_BYTES: usize = 99;
pub const MAX_NAME_BYTES: usize = 25;
pub const MAX_CITY_BYTES: usize = 15;
pub const MAX_TXID_BYTES: usize = 25;
pub const MAX_DESCRIPTION_BYTES: usize = 50;
/// Longest formatted transaction amount, e.g. `9999999999.99`
pub const MAX_AMOUNT_LEN: usize = 13;

/// Transaction id placeholder meaning "no txid"
pub const NO_TXID: &str = "***";

/// EMV QRCPS top level and template tags used by the BR Code
pub mod tag {
    pub const PAYLOAD_FORMAT: u8 = 0;
    pub const INITIATION_METHOD: u8 = 1;
    pub const MERCHANT_ACCOUNT: u8 = 26;
    /// Last tag reserved for merchant account templates
    pub const MERCHANT_ACCOUNT_LAST: u8 = 51;
    pub const MERCHANT_CATEGORY_CODE: u8 = 52;
    pub const CURRENCY: u8 = 53;
    pub const AMOUNT: u8 = 54;
    pub const COUNTRY: u8 = 58;
    pub const MERCHANT_NAME: u8 = 59;
    pub const MERCHANT_CITY: u8 = 60;
    pub const ADDITIONAL_DATA: u8 = 62;
    pub const CRC: u8 = 63;

    /// Inside [`MERCHANT_ACCOUNT`]
    pub const GUI: u8 = 0;
    pub const KEY: u8 = 1;
    pub const DESCRIPTION: u8 = 2;

    /// Inside [`ADDITIONAL_DATA`]
    pub const TXID: u8 = 5;
}

pub(crate) const PAYLOAD_FORMAT: &str = "01";
pub(crate) const MERCHANT_CATEGORY_CODE: &str = "0000";
/// ISO 4217 numeric code for BRL
pub(crate) const CURRENCY_BRL: &str = "986";
pub(crate) const COUNTRY_BR: &str = "BR";

/// Point of Initiation Method (tag 01)
///
/// | Value | Method  |
/// |-------|---------|
/// | 11    | Static  |
/// | 12    | Dynamic |
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InitiationMethod {
    /// Code may be paid more than once
    #[default]
    Static,
    /// Code is meant for a single payment
    Dynamic,
}

impl InitiationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "11",
            Self::Dynamic => "12",
        }
    }
}

impl TryFrom<u8> for InitiationMethod {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            11 => Ok(Self::Static),
            12 => Ok(Self::Dynamic),
            _ => Err(value),
        }
    }
}

impl From<InitiationMethod> for u8 {
    fn from(value: InitiationMethod) -> Self {
        match value {
            InitiationMethod::Static => 11,
            InitiationMethod::Dynamic => 12,
        }
    }
}

/// Shape of a PIX key, see [`PixKey`]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyKind {
    Email,
    Phone,
    /// CPF (11 digits) or CNPJ (14 digits)
    TaxId,
    /// Random key, or anything not recognized as one of the other kinds
    Evp,
}

/// Identifier of the receiving account, already in the form it is embedded in the payload
///
/// Use the constructors to pick the kind explicitly, or
/// [`classify_key`](crate::normalize::classify_key) to guess it.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixKey {
    /// Lowercase address
    Email(String),
    /// `+` followed by country code and digits
    Phone(String),
    /// Digits only, leading zeros kept
    TaxId(String),
    Evp(String),
}

impl PixKey {
    pub fn email(value: &str) -> Self {
        Self::Email(value.trim().to_lowercase())
    }

    /// Keeps the digits only, a bare 11 digit brazilian mobile number gets the `+55` prefix
    pub fn phone(value: &str) -> Self {
        let digits = only_digits(value);
        if digits.len() == 11 {
            Self::Phone(format!("+55{digits}"))
        } else {
            Self::Phone(format!("+{digits}"))
        }
    }

    /// Strips the CPF/CNPJ punctuation, never goes through an integer
    pub fn tax_id(value: &str) -> Self {
        Self::TaxId(only_digits(value))
    }

    pub fn evp(value: &str) -> Self {
        Self::Evp(value.trim().to_string())
    }

    /// Rebuilds a key read back from a payload, where it is already normalized
    ///
    /// Unlike [`classify_key`](crate::normalize::classify_key) this is exact: phones are
    /// always `+` prefixed once encoded, so bare digits can only be a tax id.
    pub fn from_encoded(value: &str) -> Self {
        let is_digits = !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit());
        if value.contains('@') {
            Self::Email(value.to_string())
        } else if value.starts_with('+') && value.len() > 1 && value[1..].bytes().all(|b| b.is_ascii_digit()) {
            Self::Phone(value.to_string())
        } else if is_digits && matches!(value.len(), 11 | 14) {
            Self::TaxId(value.to_string())
        } else {
            Self::Evp(value.to_string())
        }
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            Self::Email(_) => KeyKind::Email,
            Self::Phone(_) => KeyKind::Phone,
            Self::TaxId(_) => KeyKind::TaxId,
            Self::Evp(_) => KeyKind::Evp,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Email(v) | Self::Phone(v) | Self::TaxId(v) | Self::Evp(v) => v,
        }
    }
}

impl fmt::Display for PixKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn only_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strictly positive amount of BRL, stored in cents
///
/// Always rendered with exactly 2 decimals and a `.` separator.
/// Parse with [`str::parse`], see [`normalize_amount`](crate::normalize::normalize_amount).
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Amount {
    cents: u64,
}

impl Amount {
    /// `None` for zero
    pub fn from_cents(cents: u64) -> Option<Self> {
        (cents > 0).then_some(Self { cents })
    }

    pub fn cents(&self) -> u64 {
        self.cents
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

/// Decoded BR Code
///
/// Based on the [BR Code manual](https://www.bcb.gov.br/estabilidadefinanceira/pix) of the Banco Central do Brasil
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BrCode {
    /// Absent when the payload omits tag 01
    pub initiation: Option<InitiationMethod>,
    pub key: PixKey,
    pub description: Option<String>,
    pub merchant_category_code: String,
    /// ISO 4217 numeric
    pub currency: String,
    pub amount: Option<Amount>,
    pub country: String,
    pub merchant_name: String,
    pub merchant_city: String,
    pub txid: Option<String>,
    /// CCITT-FALSE [CRC16][super::crc16], already checked against the payload
    pub crc16: u16,
}

/// The CRC field has to be the last thing in `value`
impl<'a> TryFrom<&'a [u8]> for BrCode {
    type Error = nom::error::Error<&'a [u8]>;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        match all_consuming(payload)(value).finish() {
            Ok((_, brcode)) => Ok(brcode),
            Err(e) => Err(e),
        }
    }
}

impl<'a> TryFrom<&'a str> for BrCode {
    type Error = nom::error::Error<&'a [u8]>;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        Self::try_from(value.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_constructors() {
        assert_eq!(PixKey::email(" Teste@Email.com "), PixKey::Email("teste@email.com".into()));
        assert_eq!(PixKey::phone("(11) 99999-9999"), PixKey::Phone("+5511999999999".into()));
        assert_eq!(PixKey::phone("+55 11 99999-9999"), PixKey::Phone("+5511999999999".into()));
        assert_eq!(PixKey::tax_id("000.000.001-91"), PixKey::TaxId("00000000191".into()));
        assert_eq!(PixKey::tax_id("00.000.000/0001-91"), PixKey::TaxId("00000000000191".into()));
    }

    #[test]
    fn key_from_encoded() {
        assert_eq!(PixKey::from_encoded("+5511999999999").kind(), KeyKind::Phone);
        assert_eq!(PixKey::from_encoded("79912345678").kind(), KeyKind::TaxId);
        assert_eq!(PixKey::from_encoded("a@b.co").kind(), KeyKind::Email);
        assert_eq!(
            PixKey::from_encoded("123e4567-e89b-12d3-a456-426614174000").kind(),
            KeyKind::Evp
        );
        assert_eq!(PixKey::from_encoded("+").kind(), KeyKind::Evp);
    }

    #[test]
    fn amount_display() {
        assert_eq!(Amount::from_cents(1000).unwrap().to_string(), "10.00");
        assert_eq!(Amount::from_cents(5).unwrap().to_string(), "0.05");
        assert_eq!(Amount::from_cents(123456).unwrap().to_string(), "1234.56");
        assert_eq!(Amount::from_cents(0), None);
    }

    #[test]
    fn initiation_method() {
        assert_eq!(InitiationMethod::try_from(12), Ok(InitiationMethod::Dynamic));
        assert_eq!(InitiationMethod::try_from(13), Err(13));
        assert_eq!(u8::from(InitiationMethod::Static), 11);
        assert_eq!(InitiationMethod::Dynamic.as_str(), "12");
    }
}
