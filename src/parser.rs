use log::trace;
use nom::{
    bytes::complete::{tag, take, take_while_m_n},
    character::complete::{digit1, one_of},
    combinator::{all_consuming, map, opt, verify},
    error::{Error, ErrorKind},
    multi::{many0, many_till},
    sequence::{pair, preceded},
    IResult,
};

use crate::{crc16, protocol::*};

/// Parse two ASCII decimal digits, as used by both tags and lengths
fn two_digits(input: &[u8]) -> IResult<&[u8], u8> {
    map(take_while_m_n(2, 2, |b: u8| b.is_ascii_digit()), |d: &[u8]| {
        (d[0] - b'0') * 10 + (d[1] - b'0')
    })(input)
}

/// Parse a single data object
///
/// Following EMV QRCPS, takes a 2 digit `tag`, a 2 digit `length` and `length` bytes of value
pub fn field(input: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    let (input, tag) = two_digits(input)?;
    let (input, length) = two_digits(input)?;
    let (input, value) = take(length)(input)?;
    Ok((input, (tag, value)))
}

/// Parse the value of a template: data objects all the way through
pub fn template(input: &[u8]) -> IResult<&[u8], Vec<(u8, &[u8])>> {
    all_consuming(many0(field))(input)
}

/// Parse a decimal amount into its integer and optional fractional digits
///
/// Either `.` or `,` separates them, the whole input has to be consumed.
pub fn amount(input: &[u8]) -> IResult<&[u8], (&[u8], Option<&[u8]>)> {
    all_consuming(pair(digit1, opt(preceded(one_of(".,"), digit1))))(input)
}

/// Parse a transaction amount the way it is written in field 54: digits, `.` and 2 decimals
fn encoded_amount(input: &[u8]) -> IResult<&[u8], Amount> {
    let (input, (units, cents)) = all_consuming(pair(
        digit1,
        preceded(tag("."), take_while_m_n(2, 2, |b: u8| b.is_ascii_digit())),
    ))(input)?;
    let amount = units
        .iter()
        .chain(cents)
        .try_fold(0u64, |acc, d| acc.checked_mul(10)?.checked_add((d - b'0') as u64))
        .and_then(Amount::from_cents)
        .ok_or_else(|| invalid(input))?;
    Ok((input, amount))
}

fn crc_value(input: &[u8]) -> IResult<&[u8], u16> {
    map(
        take_while_m_n(4, 4, |b: u8| b.is_ascii_hexdigit()),
        |hex: &[u8]| {
            hex.iter().fold(0u16, |crc, &b| {
                (crc << 4) | (b as char).to_digit(16).unwrap_or_default() as u16
            })
        },
    )(input)
}

fn invalid(input: &[u8]) -> nom::Err<Error<&[u8]>> {
    nom::Err::Failure(Error::new(input, ErrorKind::Verify))
}

fn text(value: &[u8]) -> Result<String, nom::Err<Error<&[u8]>>> {
    std::str::from_utf8(value)
        .map(str::to_string)
        .map_err(|_| invalid(value))
}

/// Key and description of the merchant account template carrying the PIX [`GUI`]
///
/// `None` for templates of other arrangements.
fn pix_account(value: &[u8]) -> Result<Option<(PixKey, Option<String>)>, nom::Err<Error<&[u8]>>> {
    let (_, fields) = template(value)?;
    let is_pix = fields
        .iter()
        .any(|(id, v)| *id == tag::GUI && v.eq_ignore_ascii_case(GUI.as_bytes()));
    if !is_pix {
        return Ok(None);
    }

    let mut key = None;
    let mut description = None;
    for (id, v) in fields {
        match id {
            tag::KEY => key = Some(PixKey::from_encoded(&text(v)?)),
            tag::DESCRIPTION => description = Some(text(v)?),
            _ => {}
        }
    }
    let key = key.ok_or_else(|| invalid(value))?;
    Ok(Some((key, description)))
}

/// Parse a BR Code payload
///
/// It does 3 main error checks:
/// - Payload format indicator comes first and is `01`
/// - CRC is computed over every byte up to its own tag and length and verified against the one sent
/// - Merchant account, category code, currency, country, name and city are all present
///
/// Tags this crate does not model are skipped.
pub fn payload(input: &[u8]) -> IResult<&[u8], BrCode> {
    let (rest, _format) = tag("000201")(input)?;
    let (rest, (fields, _crc_header)) = many_till(field, tag("6304"))(rest)?;
    let calculated_crc16 = crc16(&input[..input.len() - rest.len()]);
    let (rest, crc16) = verify(crc_value, |crc16| *crc16 == calculated_crc16)(rest)?;

    let mut initiation = None;
    let mut account = None;
    let mut merchant_category_code = None;
    let mut currency = None;
    let mut amount = None;
    let mut country = None;
    let mut merchant_name = None;
    let mut merchant_city = None;
    let mut txid = None;

    for (id, value) in fields {
        match id {
            tag::INITIATION_METHOD => {
                let (_, method) = all_consuming(two_digits)(value)?;
                let method = InitiationMethod::try_from(method).map_err(|_| invalid(value))?;
                initiation = Some(method);
            }
            tag::MERCHANT_ACCOUNT..=tag::MERCHANT_ACCOUNT_LAST if account.is_none() => {
                account = pix_account(value)?;
            }
            tag::MERCHANT_CATEGORY_CODE => merchant_category_code = Some(text(value)?),
            tag::CURRENCY => currency = Some(text(value)?),
            tag::AMOUNT => {
                let (_, parsed) = encoded_amount(value)?;
                amount = Some(parsed);
            }
            tag::COUNTRY => country = Some(text(value)?),
            tag::MERCHANT_NAME => merchant_name = Some(text(value)?),
            tag::MERCHANT_CITY => merchant_city = Some(text(value)?),
            tag::ADDITIONAL_DATA => {
                let (_, additional) = template(value)?;
                if let Some((_, v)) = additional.into_iter().find(|(id, _)| *id == tag::TXID) {
                    txid = Some(text(v)?).filter(|t| !t.is_empty());
                }
            }
            _ => trace!("skipping field {id:02}"),
        }
    }

    let missing = || invalid(input);
    let (key, description) = account.ok_or_else(missing)?;

    Ok((
        rest,
        BrCode {
            initiation,
            key,
            description,
            merchant_category_code: merchant_category_code.ok_or_else(missing)?,
            currency: currency.ok_or_else(missing)?,
            amount,
            country: country.ok_or_else(missing)?,
            merchant_name: merchant_name.ok_or_else(missing)?,
            merchant_city: merchant_city.ok_or_else(missing)?,
            txid,
            crc16,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field() {
        let (input, (tag, value)) = field(b"0014BR.GOV.BCB.PIX0115").unwrap();
        assert_eq!(input, b"0115");
        assert_eq!(tag, 0);
        assert_eq!(value, b"BR.GOV.BCB.PIX");
    }

    #[test]
    fn parse_field_too_short() {
        assert!(field(b"0015BR.GOV.BCB.PIX").is_err());
        assert!(field(b"0A01x").is_err());
        assert!(field(b"00").is_err());
    }

    #[test]
    fn parse_template() {
        let (_, fields) = template(b"0509PEDIDO123").unwrap();
        assert_eq!(fields, vec![(5u8, &b"PEDIDO123"[..])]);
        assert!(template(b"0509PEDIDO").is_err());
        assert!(template(b"").unwrap().1.is_empty());
    }

    #[test]
    fn parse_amount() {
        let (_, (units, decimals)) = amount(b"10.00").unwrap();
        assert_eq!(units, b"10");
        assert_eq!(decimals, Some(&b"00"[..]));
        let (_, (units, decimals)) = amount(b"7").unwrap();
        assert_eq!(units, b"7");
        assert_eq!(decimals, None);
        assert!(amount(b"1,5").is_ok());
        assert!(amount(b"1.").is_err());
        assert!(amount(b"-1").is_err());
    }

    #[test]
    fn parse_encoded_amount() {
        assert_eq!(encoded_amount(b"10.00").unwrap().1, Amount::from_cents(1000).unwrap());
        assert_eq!(encoded_amount(b"0.05").unwrap().1, Amount::from_cents(5).unwrap());
        assert!(encoded_amount(b"10,00").is_err());
        assert!(encoded_amount(b"10.000").is_err());
        assert!(encoded_amount(b"10.5").is_err());
        assert!(encoded_amount(b"10").is_err());
        assert!(encoded_amount(b"0.00").is_err());
        assert!(encoded_amount(b"99999999999999999999.00").is_err());
    }

    #[test]
    fn parse_rejects_lenient_amount() {
        let input = b"00020101021126370014BR.GOV.BCB.PIX0115teste@email.com520400005303986540510,005802BR5910LOJA TESTE6009SAO PAULO630496C2";
        assert!(payload(input).is_err());
    }

    #[test]
    fn parse_crc_value() {
        assert_eq!(crc_value(b"5BAB").unwrap().1, 0x5BAB);
        assert_eq!(crc_value(b"09fa").unwrap().1, 0x09FA);
        assert!(crc_value(b"5BA").is_err());
    }

    #[test]
    fn parse_static_payload() {
        let input = b"00020101021126370014BR.GOV.BCB.PIX0115teste@email.com520400005303986540510.005802BR5910LOJA TESTE6009SAO PAULO63045BAB";
        let (input, brcode) = payload(input).unwrap();
        assert_eq!(input, b"");
        assert_eq!(
            brcode,
            BrCode {
                initiation: Some(InitiationMethod::Static),
                key: PixKey::Email("teste@email.com".into()),
                description: None,
                merchant_category_code: "0000".into(),
                currency: "986".into(),
                amount: Amount::from_cents(1000),
                country: "BR".into(),
                merchant_name: "LOJA TESTE".into(),
                merchant_city: "SAO PAULO".into(),
                txid: None,
                crc16: 0x5BAB,
            }
        );
    }

    #[test]
    fn parse_full_payload() {
        let input = b"00020101021126530014BR.GOV.BCB.PIX0111123456789090216PAGAMENTO NO 123520400005303986540515.995802BR5913JOSE DA SILVA6009SAO PAULO62130509PEDIDO1236304ADDF";
        let (input, brcode) = payload(input).unwrap();
        assert_eq!(input, b"");
        assert_eq!(
            brcode,
            BrCode {
                initiation: Some(InitiationMethod::Static),
                key: PixKey::TaxId("12345678909".into()),
                description: Some("PAGAMENTO NO 123".into()),
                merchant_category_code: "0000".into(),
                currency: "986".into(),
                amount: Amount::from_cents(1599),
                country: "BR".into(),
                merchant_name: "JOSE DA SILVA".into(),
                merchant_city: "SAO PAULO".into(),
                txid: Some("PEDIDO123".into()),
                crc16: 0xADDF,
            }
        );
    }

    #[test]
    fn parse_dynamic_payload() {
        let input = b"00020101021226330014BR.GOV.BCB.PIX01110000000019152040000530398654040.505802BR5913FULANO DE TAL6008BRASILIA630409FA";
        let (_, brcode) = payload(input).unwrap();
        assert_eq!(brcode.initiation, Some(InitiationMethod::Dynamic));
        assert_eq!(brcode.key, PixKey::TaxId("00000000191".into()));
        assert_eq!(brcode.amount.map(|a| a.to_string()), Some("0.50".into()));
        assert_eq!(brcode.crc16, 0x09FA);
    }

    #[test]
    fn parse_rejects_bad_crc() {
        let input = b"00020101021126370014BR.GOV.BCB.PIX0115teste@email.com520400005303986540510.005802BR5910LOJA TESTE6009SAO PAULO63045BAC";
        assert!(payload(input).is_err());
        // Same CRC, one byte of the name changed
        let input = b"00020101021126370014BR.GOV.BCB.PIX0115teste@email.com520400005303986540510.005802BR5910LOJA TESTA6009SAO PAULO63045BAB";
        assert!(payload(input).is_err());
    }

    #[test]
    fn parse_rejects_missing_format() {
        let input = b"010211";
        assert!(payload(input).is_err());
    }
}
