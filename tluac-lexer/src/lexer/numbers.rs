use atoi::{
    atoi,
    FromRadix16Checked,
};
use hexf_parse::parse_hexf64;
use logos::Lexer;
use tluac_bytecode::Number;

use super::{
    LexError,
    Lexed,
    RawToken,
};

/// Extends a numeral that starts with a digit (or `.` and a digit) over every
/// byte that could belong to it, then parses the whole run.
pub(super) fn lex_numeral(lexer: &mut Lexer<RawToken>) -> Lexed<Number> {
    let first = lexer.slice()[lexer.slice().len() - 1];
    let remain = lexer.remainder();

    let mut i = 0;
    let mut exponent: &[u8] = b"Ee";
    if first == b'0' && matches!(remain.first(), Some(b'x' | b'X')) {
        i += 1;
        exponent = b"Pp";
    }

    loop {
        if remain.get(i).map_or(false, |b| exponent.contains(b)) {
            i += 1;
            if matches!(remain.get(i), Some(b'+' | b'-')) {
                i += 1;
            }
        }

        match remain.get(i) {
            Some(b) if b.is_ascii_hexdigit() || *b == b'.' => i += 1,
            _ => break,
        }
    }

    lexer.bump(i);
    match parse_numeral(lexer.slice()) {
        Some(number) => Lexed::Valid(number),
        None => Lexed::Invalid(LexError::MalformedNumber),
    }
}

/// Parses the text of a Lua numeral.
///
/// Hex and decimal integers that fit in 64 bits become [`Number::Integer`],
/// everything else is read as a float.
pub fn parse_numeral(text: &[u8]) -> Option<Number> {
    if let Some(hex) = text
        .strip_prefix(b"0x")
        .or_else(|| text.strip_prefix(b"0X"))
    {
        return parse_hex(hex);
    }

    if !text.is_empty() && text.iter().all(u8::is_ascii_digit) {
        if let Some(int) = atoi::<i64>(text) {
            return Some(Number::Integer(int));
        }
    }

    std::str::from_utf8(text)
        .ok()?
        .parse::<f64>()
        .ok()
        .map(Number::Float)
}

fn parse_hex(digits: &[u8]) -> Option<Number> {
    if digits.is_empty() {
        return None;
    }

    if digits.iter().all(u8::is_ascii_hexdigit) {
        return Some(match u64::from_radix_16_checked(digits) {
            (Some(int), used) if used == digits.len() => match i64::try_from(int) {
                Ok(int) => Number::Integer(int),
                Err(_) => Number::Float(int as f64),
            },
            _ => Number::Float(mantissa_value(digits)),
        });
    }

    parse_hex_float(digits).map(Number::Float)
}

fn mantissa_value(digits: &[u8]) -> f64 {
    digits.iter().fold(0.0, |acc, d| {
        acc * 16.0 + f64::from(char::from(*d).to_digit(16).unwrap_or(0))
    })
}

/// Parses `<hex digits>[.<hex digits>][p[+-]<decimal digits>]`, without the
/// leading `0x`.
fn parse_hex_float(digits: &[u8]) -> Option<f64> {
    let (mantissa, exponent) = match digits.iter().position(|b| matches!(b, b'p' | b'P')) {
        Some(p) => (&digits[..p], Some(&digits[p + 1..])),
        None => (digits, None),
    };

    let (int, frac) = match mantissa.iter().position(|b| *b == b'.') {
        Some(dot) => (&mantissa[..dot], &mantissa[dot + 1..]),
        None => (mantissa, &[][..]),
    };

    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.iter().chain(frac).all(u8::is_ascii_hexdigit) {
        return None;
    }

    let exponent = match exponent {
        Some(exp) => {
            let digits = exp.strip_prefix(b"+").or_else(|| exp.strip_prefix(b"-")).unwrap_or(exp);
            if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
                return None;
            }
            atoi::<i32>(exp).unwrap_or(if exp.first() == Some(&b'-') {
                i32::MIN
            } else {
                i32::MAX
            })
        }
        None => 0,
    };

    // `hexf` needs a leading digit and an explicit exponent, and rejects values
    // it cannot represent exactly.
    let mut normalized = String::from("0x");
    normalized.push_str(if int.is_empty() { "0" } else { std::str::from_utf8(int).ok()? });
    if !frac.is_empty() {
        normalized.push('.');
        normalized.push_str(std::str::from_utf8(frac).ok()?);
    }
    normalized.push_str(&format!("p{exponent}"));

    match parse_hexf64(&normalized, false) {
        Ok(value) => Some(value),
        Err(_) => {
            let value = mantissa_value(int) * 16f64.powi(frac.len() as i32)
                + mantissa_value(frac);
            let scale = exponent.saturating_sub(4 * frac.len() as i32);
            Some(value * 2f64.powi(scale))
        }
    }
}
