use log::{debug, trace};

use crate::{
    crc16_hex,
    normalize::{classify_key, normalize_amount, normalize_text, normalize_txid, truncate_bytes},
    tag, Field, InitiationMethod, PayloadError, PixKey, COUNTRY_BR, CURRENCY_BRL, GUI,
    MAX_CITY_BYTES, MAX_DESCRIPTION_BYTES, MAX_NAME_BYTES, MAX_VALUE_BYTES,
    MERCHANT_CATEGORY_CODE, PAYLOAD_FORMAT,
};

/// Bytes taken by a tag and its length
const HEADER_LEN: usize = 4;
/// Length of the CRC field value
const CRC_LEN: usize = 4;

/// Inputs of a single BR Code
///
/// Holds the raw, caller supplied text: everything is normalized by [`PixPayload::encode`].
/// The key is already a [`PixKey`], so a wrong guess of
/// [`classify_key`] can be overridden by building it explicitly.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PixPayload<'a> {
    pub key: PixKey,
    /// Truncated to 25 bytes
    pub name: &'a str,
    /// Truncated to 15 bytes
    pub city: &'a str,
    /// Decimal, e.g. `10.00`
    pub amount: Option<&'a str>,
    /// Rejected when over 25 bytes
    pub txid: Option<&'a str>,
    /// Truncated to whatever room is left in the merchant account template
    pub description: Option<&'a str>,
    pub initiation: InitiationMethod,
}

impl<'a> PixPayload<'a> {
    /// Static payload with no amount, txid or description
    pub fn new(key: PixKey, name: &'a str, city: &'a str) -> Self {
        Self {
            key,
            name,
            city,
            amount: None,
            txid: None,
            description: None,
            initiation: InitiationMethod::Static,
        }
    }

    pub fn with_amount(mut self, amount: &'a str) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_txid(mut self, txid: &'a str) -> Self {
        self.txid = Some(txid);
        self
    }

    pub fn with_description(mut self, description: &'a str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_initiation(mut self, initiation: InitiationMethod) -> Self {
        self.initiation = initiation;
        self
    }

    /// Build the payload string, CRC included
    ///
    /// # Errors
    ///
    /// - [`PayloadError::MissingRequiredField`] if key, name or city is blank
    /// - [`PayloadError::InvalidAmount`] if the amount is not a positive decimal
    /// - [`PayloadError::EmptyAfterNormalization`] if name, city or txid has no usable character
    /// - [`PayloadError::FieldTooLong`] if txid, amount or key do not fit their field
    pub fn encode(&self) -> Result<String, PayloadError> {
        require(self.key.as_str(), Field::Key)?;
        require(self.name, Field::Name)?;
        require(self.city, Field::City)?;

        let amount = present(self.amount).map(normalize_amount).transpose()?;
        let txid = present(self.txid).map(normalize_txid).transpose()?;
        let name = merchant_text(self.name, MAX_NAME_BYTES, Field::Name)?;
        let city = merchant_text(self.city, MAX_CITY_BYTES, Field::City)?;
        let account = self.merchant_account()?;

        let mut payload = String::with_capacity(128);

        push_field(&mut payload, tag::PAYLOAD_FORMAT, PAYLOAD_FORMAT);
        push_field(&mut payload, tag::INITIATION_METHOD, self.initiation.as_str());
        push_field(&mut payload, tag::MERCHANT_ACCOUNT, &account);
        push_field(&mut payload, tag::MERCHANT_CATEGORY_CODE, MERCHANT_CATEGORY_CODE);
        push_field(&mut payload, tag::CURRENCY, CURRENCY_BRL);
        if let Some(amount) = amount {
            push_field(&mut payload, tag::AMOUNT, &amount.to_string());
        }
        push_field(&mut payload, tag::COUNTRY, COUNTRY_BR);
        push_field(&mut payload, tag::MERCHANT_NAME, &name);
        push_field(&mut payload, tag::MERCHANT_CITY, &city);
        if let Some(txid) = txid {
            let mut additional = String::new();
            push_field(&mut additional, tag::TXID, &txid);
            push_field(&mut payload, tag::ADDITIONAL_DATA, &additional);
        }

        // The CRC covers its own tag and length
        payload.push_str(&format!("{:02}{:02}", tag::CRC, CRC_LEN));
        let crc = crc16_hex(payload.as_bytes());
        payload.push_str(&crc);

        debug!(
            "built {:?} pix payload for a {:?} key, {} bytes, crc {}",
            self.initiation,
            self.key.kind(),
            payload.len(),
            crc
        );
        Ok(payload)
    }

    /// Template 26: GUI, key and the optional description
    fn merchant_account(&self) -> Result<String, PayloadError> {
        let mut account = String::new();
        push_field(&mut account, tag::GUI, GUI);
        push_checked(&mut account, tag::KEY, self.key.as_str(), Field::Key)?;

        if let Some(description) = present(self.description) {
            let description = normalize_text(description);
            let room = MAX_VALUE_BYTES
                .saturating_sub(account.len() + HEADER_LEN)
                .min(MAX_DESCRIPTION_BYTES);
            let description = truncate_bytes(&description, room).trim_end();
            if !description.is_empty() {
                push_field(&mut account, tag::DESCRIPTION, description);
            }
        }

        if account.len() > MAX_VALUE_BYTES {
            return Err(PayloadError::FieldTooLong {
                field: Field::MerchantAccount,
                max: MAX_VALUE_BYTES,
                actual: account.len(),
            });
        }
        Ok(account)
    }
}

/// Build a BR Code from raw form input
///
/// The key kind is guessed with [`classify_key`]. Blank `amount`, `txid` and `description`
/// are treated as absent. `dynamic` selects initiation method 12 instead of 11.
///
/// ```
/// let payload = pix_brcode::build_payload(
///     "teste@email.com", "Loja Teste", "São Paulo", Some("10.00"), None, None, false,
/// ).unwrap();
/// assert!(payload.contains("5910LOJA TESTE"));
/// ```
pub fn build_payload(
    key: &str,
    name: &str,
    city: &str,
    amount: Option<&str>,
    txid: Option<&str>,
    description: Option<&str>,
    dynamic: bool,
) -> Result<String, PayloadError> {
    require(key, Field::Key)?;
    require(name, Field::Name)?;
    require(city, Field::City)?;

    let initiation = if dynamic {
        InitiationMethod::Dynamic
    } else {
        InitiationMethod::Static
    };

    PixPayload {
        key: classify_key(key).key,
        name,
        city,
        amount,
        txid,
        description,
        initiation,
    }
    .encode()
}

fn require(value: &str, field: Field) -> Result<(), PayloadError> {
    if value.trim().is_empty() {
        Err(PayloadError::MissingRequiredField(field))
    } else {
        Ok(())
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Normalized then truncated name or city
fn merchant_text(value: &str, max_bytes: usize, field: Field) -> Result<String, PayloadError> {
    let normalized = normalize_text(value);
    let truncated = truncate_bytes(&normalized, max_bytes).trim_end();
    if truncated.is_empty() {
        return Err(PayloadError::EmptyAfterNormalization(field));
    }
    Ok(truncated.to_string())
}

/// Appends `tag`, the 2 digit UTF-8 byte length of `value` and `value`
///
/// Only for values bounded to [`MAX_VALUE_BYTES`] beforehand.
fn push_field(out: &mut String, tag: u8, value: &str) {
    let length = value.as_bytes().len();
    debug_assert!(length <= MAX_VALUE_BYTES, "field {tag:02} is {length} bytes");
    trace!("field {tag:02}: {length} bytes");
    out.push_str(&format!("{tag:02}{length:02}"));
    out.push_str(value);
}

fn push_checked(out: &mut String, tag: u8, value: &str, field: Field) -> Result<(), PayloadError> {
    let length = value.as_bytes().len();
    if length > MAX_VALUE_BYTES {
        return Err(PayloadError::FieldTooLong {
            field,
            max: MAX_VALUE_BYTES,
            actual: length,
        });
    }
    push_field(out, tag, value);
    Ok(())
}
