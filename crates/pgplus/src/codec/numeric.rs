//! Exact `numeric` <-> decimal text over the binary wire format.
//!
//! The wire value is a header (`ndigits`, `weight`, `sign`, `dscale`, all
//! 16-bit) followed by `ndigits` base-10000 digits. Going through text keeps
//! every digit, the display scale, `NaN` and the infinities, none of which
//! survive a fixed-precision decimal.

use bytes::{BufMut, BytesMut};
use std::error::Error;
use std::fmt::Write;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

const SIGN_POS: u16 = 0x0000;
const SIGN_NEG: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_PINF: u16 = 0xD000;
const SIGN_NINF: u16 = 0xF000;

const DEC_DIGITS: usize = 4;
const MAX_INT_DIGITS: i64 = 131_072;
const MAX_SCALE: usize = 16_383;

/// A `numeric` value as its exact decimal text: `"12.500"`, `"-0.00001"`,
/// `"NaN"`, `"Infinity"`. Scale is kept as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericText(pub String);

impl NumericText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NumericText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        read_numeric(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

impl ToSql for NumericText {
    fn to_sql(&self, _: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        write_numeric(&self.0, out)?;
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }

    to_sql_checked!();
}

/// Render a binary `numeric` as decimal text.
pub(crate) fn read_numeric(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() < 8 || raw.len() % 2 != 0 {
        return Err("malformed numeric value".into());
    }
    let words: Vec<u16> = raw
        .chunks_exact(2)
        .map(|w| u16::from_be_bytes([w[0], w[1]]))
        .collect();
    let ndigits = usize::from(words[0]);
    let weight = i64::from(i16::from_be_bytes(words[1].to_be_bytes()));
    let sign = words[2];
    let dscale = usize::from(words[3]);
    let digits = &words[4..];

    match sign {
        SIGN_NAN => return Ok("NaN".into()),
        SIGN_PINF => return Ok("Infinity".into()),
        SIGN_NINF => return Ok("-Infinity".into()),
        SIGN_POS | SIGN_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{other:04x}").into()),
    }
    if digits.len() != ndigits {
        return Err("numeric digit count does not match its header".into());
    }
    if digits.iter().any(|&d| d >= 10_000) {
        return Err("numeric digit out of range".into());
    }

    let digit_at = |i: i64| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i))
            .copied()
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == SIGN_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            let d = digit_at(i);
            if i == 0 {
                write!(out, "{d}")?;
            } else {
                write!(out, "{d:04}")?;
            }
        }
    }
    if dscale > 0 {
        out.push('.');
        let mut frac = String::with_capacity(dscale + DEC_DIGITS);
        let mut i = weight + 1;
        while frac.len() < dscale {
            write!(frac, "{:04}", digit_at(i))?;
            i += 1;
        }
        frac.truncate(dscale);
        out.push_str(&frac);
    }
    Ok(out)
}

/// Encode decimal text (`-12.5`, `1e40`, `NaN`, `Infinity`) as a binary
/// `numeric`.
pub(crate) fn write_numeric(text: &str, out: &mut BytesMut) -> Result<(), BoxError> {
    let text = text.trim();
    let special = match text.to_ascii_lowercase().as_str() {
        "nan" => Some(SIGN_NAN),
        "infinity" | "+infinity" | "inf" | "+inf" => Some(SIGN_PINF),
        "-infinity" | "-inf" => Some(SIGN_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        out.put_u16(0);
        out.put_i16(0);
        out.put_u16(sign);
        out.put_u16(0);
        return Ok(());
    }

    let invalid = || -> BoxError { format!("invalid numeric literal {text:?}").into() };

    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (
            &body[..pos],
            body[pos + 1..].parse::<i64>().map_err(|_| invalid())?,
        ),
        None => (body, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    // Move the decimal point by the exponent.
    let all = [int_part, frac_part].concat();
    let point = i64::try_from(int_part.len())?
        .checked_add(exponent)
        .ok_or_else(invalid)?;
    if point > MAX_INT_DIGITS || point < -i64::try_from(MAX_SCALE)? {
        return Err(format!("numeric literal {text:?} is out of range").into());
    }
    let (int_digits, frac_digits) = if point <= 0 {
        let zeros = "0".repeat(usize::try_from(-point)?);
        (String::new(), zeros + &all)
    } else {
        let p = usize::try_from(point)?;
        if p >= all.len() {
            (all.clone() + &"0".repeat(p - all.len()), String::new())
        } else {
            (all[..p].to_owned(), all[p..].to_owned())
        }
    };
    if frac_digits.len() > MAX_SCALE {
        return Err(format!("numeric literal {text:?} has too many fractional digits").into());
    }
    let dscale = u16::try_from(frac_digits.len())?;
    let int_digits = int_digits.trim_start_matches('0');

    let int_pad = (DEC_DIGITS - int_digits.len() % DEC_DIGITS) % DEC_DIGITS;
    let frac_pad = (DEC_DIGITS - frac_digits.len() % DEC_DIGITS) % DEC_DIGITS;
    let padded = format!(
        "{}{}{}{}",
        "0".repeat(int_pad),
        int_digits,
        frac_digits,
        "0".repeat(frac_pad)
    );
    let mut groups: Vec<u16> = padded
        .as_bytes()
        .chunks(DEC_DIGITS)
        .map(|c| c.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0')))
        .collect();

    let mut weight = i64::try_from((int_pad + int_digits.len()) / DEC_DIGITS)? - 1;
    let leading = groups.iter().take_while(|&&g| g == 0).count();
    groups.drain(..leading);
    weight -= i64::try_from(leading)?;
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    out.put_u16(u16::try_from(groups.len())?);
    out.put_i16(i16::try_from(weight)?);
    out.put_u16(if negative && !groups.is_empty() {
        SIGN_NEG
    } else {
        SIGN_POS
    });
    out.put_u16(dscale);
    for group in groups {
        out.put_u16(group);
    }
    Ok(())
}
