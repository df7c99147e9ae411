use std::fmt;

use thiserror::Error;

/// Caller supplied input a payload is built from
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Field {
    Key,
    Name,
    City,
    Amount,
    Txid,
    Description,
    /// Merchant Account Information template (tag 26) as a whole
    MerchantAccount,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Key => "pix key",
            Self::Name => "merchant name",
            Self::City => "merchant city",
            Self::Amount => "amount",
            Self::Txid => "txid",
            Self::Description => "description",
            Self::MerchantAccount => "merchant account information",
        })
    }
}

/// Errors that may occur while building a BR Code payload
///
/// None of them are transient: the same input always fails the same way.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PayloadError {
    /// Key, name or city was empty
    #[error("missing required field: {0}")]
    MissingRequiredField(Field),

    /// Amount was not a decimal number or was not strictly positive
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    /// Value does not fit its EMV field
    #[error("{field} is {actual} bytes long, at most {max} allowed")]
    FieldTooLong {
        field: Field,
        max: usize,
        actual: usize,
    },

    /// Nothing was left once diacritics and symbols were stripped
    #[error("{0} is empty after normalization")]
    EmptyAfterNormalization(Field),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        assert_eq!(
            PayloadError::MissingRequiredField(Field::City).to_string(),
            "missing required field: merchant city"
        );
        assert_eq!(
            PayloadError::FieldTooLong {
                field: Field::Txid,
                max: 25,
                actual: 30
            }
            .to_string(),
            "txid is 30 bytes long, at most 25 allowed"
        );
        assert_eq!(
            PayloadError::InvalidAmount("-1".into()).to_string(),
            "invalid amount: \"-1\""
        );
    }
}
