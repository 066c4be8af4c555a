//! Literal decoding: numeric constants and string escapes.
//!
//! ## Numbers
//!
//! The scanner accepts a loose character set for numbers; the value is
//! only validated here, when the compiler asks for it.
//!
//! | Form | Meaning |
//! |------|---------|
//! | `1_000` | separators are ignored |
//! | `0x1f` `0o17` `0b101` `0n13` | base 16, 8, 2 and 4 |
//! | `0f3f800000` | 8 or 16 hex digits reinterpreted as f32/f64 bits |
//! | `1.5` `2e3` | floats |
//! | `4k` `2m` `1g` `1t` | powers of 1000 |
//! | `4kb` `2mb` `1gb` `1tb` `8b` | powers of 1024 |
//! | `3j` | imaginary |
//!
//! ## Escapes
//!
//! `\a \b \f \n \r \t \v \\ \" \'`, `\oNNN` (octal), `\xNN`, `\uNNNN`
//! and `\UNNNNNNNN` (hex). Unknown escapes are kept verbatim so regex
//! strings like `r"\d+"` survive.

use num_bigint::BigInt;
use num_traits::{Num, ToPrimitive};

/// A decoded numeric literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    /// Integer that fits in 64 bits
    Int(i64),
    /// Integer that does not
    BigInt(BigInt),
    /// Floating point value
    Float(f64),
    /// Imaginary value `0 + im*j`
    Imaginary(f64),
}

const SUFFIXES: &[(&str, u64)] = &[
    ("tb", 1 << 40),
    ("gb", 1 << 30),
    ("mb", 1 << 20),
    ("kb", 1 << 10),
    ("b", 1),
    ("t", 1_000_000_000_000),
    ("g", 1_000_000_000),
    ("m", 1_000_000),
    ("k", 1_000),
];

const PREFIXES: &[(&str, u32)] = &[("0x", 16), ("0o", 8), ("0n", 4), ("0b", 2)];

const INVALID: &str = "invalid numerical constant";

/// Parses the text of a number lexeme.
pub fn parse_number(text: &str) -> Result<Number, String> {
    let mut text = text.replace('_', "");

    let imaginary = text.ends_with('j');
    if imaginary {
        text.pop();
    }

    let value = if let Some(bits) = text.strip_prefix("0f") {
        parse_float_bits(bits)?
    } else if let Some((digits, base)) = PREFIXES
        .iter()
        .find_map(|(prefix, base)| text.strip_prefix(prefix).map(|d| (d, *base)))
        .filter(|(digits, _)| !digits.is_empty())
    {
        parse_int(digits, base).ok_or_else(|| INVALID.to_string())?
    } else {
        parse_decimal(&text)?
    };

    if imaginary {
        let im = match value {
            Number::Int(n) => n as f64,
            Number::BigInt(n) => n.to_f64().unwrap_or(f64::INFINITY),
            Number::Float(f) => f,
            Number::Imaginary(_) => return Err(INVALID.to_string()),
        };
        return Ok(Number::Imaginary(im));
    }
    Ok(value)
}

fn parse_decimal(text: &str) -> Result<Number, String> {
    let (body, factor) = SUFFIXES
        .iter()
        .find_map(|(suffix, factor)| {
            text.strip_suffix(suffix)
                .filter(|body| !body.is_empty())
                .map(|body| (body, *factor))
        })
        .unwrap_or((text, 1));

    if let Some(n) = parse_int(body, 10) {
        return Ok(scale_int(n, factor));
    }
    if body.contains('.') || body.contains('e') {
        if let Ok(f) = body.parse::<f64>() {
            return Ok(Number::Float(f * factor as f64));
        }
    }
    Err(INVALID.to_string())
}

fn parse_float_bits(digits: &str) -> Result<Number, String> {
    const MESSAGE: &str = "invalid numerical constant expected 8 or 16 digits";
    match digits.len() {
        8 => u32::from_str_radix(digits, 16)
            .map(|bits| Number::Float(f32::from_bits(bits) as f64))
            .map_err(|_| MESSAGE.to_string()),
        16 => u64::from_str_radix(digits, 16)
            .map(|bits| Number::Float(f64::from_bits(bits)))
            .map_err(|_| MESSAGE.to_string()),
        _ => Err(MESSAGE.to_string()),
    }
}

fn parse_int(digits: &str, base: u32) -> Option<Number> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(base)) {
        return None;
    }
    match i64::from_str_radix(digits, base) {
        Ok(n) => Some(Number::Int(n)),
        Err(_) => BigInt::from_str_radix(digits, base).ok().map(Number::BigInt),
    }
}

fn scale_int(n: Number, factor: u64) -> Number {
    if factor == 1 {
        return n;
    }
    match n {
        Number::Int(v) => match i64::try_from(factor).ok().and_then(|f| v.checked_mul(f)) {
            Some(product) => Number::Int(product),
            None => Number::BigInt(BigInt::from(v) * factor),
        },
        Number::BigInt(v) => Number::BigInt(v * factor),
        other => other,
    }
}

/// Number of digits and radix read after `\o`, `\x`, `\u` and `\U`.
pub fn escape_width(c: char) -> Option<(usize, u32)> {
    match c {
        'o' => Some((3, 8)),
        'x' => Some((2, 16)),
        'u' => Some((4, 16)),
        'U' => Some((8, 16)),
        _ => None,
    }
}

/// Single character escapes.
pub fn simple_escape(c: char) -> Option<char> {
    match c {
        'a' => Some('\u{07}'),
        'b' => Some('\u{08}'),
        'f' => Some('\u{0c}'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'v' => Some('\u{0b}'),
        '\\' => Some('\\'),
        _ => None,
    }
}

/// Decodes the digits of a numeric escape.
pub fn decode_escape(digits: &str, radix: u32) -> Option<char> {
    u32::from_str_radix(digits, radix).ok().and_then(char::from_u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(parse_number("42"), Ok(Number::Int(42)));
        assert_eq!(parse_number("1_000"), Ok(Number::Int(1000)));
        assert_eq!(parse_number("0x1f"), Ok(Number::Int(31)));
        assert_eq!(parse_number("0o17"), Ok(Number::Int(15)));
        assert_eq!(parse_number("0b101"), Ok(Number::Int(5)));
        assert_eq!(parse_number("0n13"), Ok(Number::Int(7)));
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(parse_number("4k"), Ok(Number::Int(4000)));
        assert_eq!(parse_number("2kb"), Ok(Number::Int(2048)));
        assert_eq!(parse_number("1mb"), Ok(Number::Int(1 << 20)));
        assert_eq!(parse_number("8b"), Ok(Number::Int(8)));
        assert_eq!(parse_number("1.5k"), Ok(Number::Float(1500.0)));
        // hex digits are never mistaken for a byte suffix
        assert_eq!(parse_number("0xfb"), Ok(Number::Int(251)));
    }

    #[test]
    fn test_floats() {
        assert_eq!(parse_number("3.25"), Ok(Number::Float(3.25)));
        assert_eq!(parse_number(".5"), Ok(Number::Float(0.5)));
        assert_eq!(parse_number("2e3"), Ok(Number::Float(2000.0)));
        assert_eq!(parse_number("0f3f800000"), Ok(Number::Float(1.0)));
        assert_eq!(parse_number("0f3ff0000000000000"), Ok(Number::Float(1.0)));
    }

    #[test]
    fn test_imaginary() {
        assert_eq!(parse_number("3j"), Ok(Number::Imaginary(3.0)));
        assert_eq!(parse_number("1.5j"), Ok(Number::Imaginary(1.5)));
    }

    #[test]
    fn test_big_integers() {
        let n = parse_number("123456789012345678901234567890").unwrap();
        assert!(matches!(n, Number::BigInt(_)));
        assert!(matches!(parse_number("9223372036854775807k"), Ok(Number::BigInt(_))));
    }

    #[test]
    fn test_invalid() {
        assert_eq!(parse_number("12abc"), Err(INVALID.to_string()));
        assert_eq!(parse_number("0x"), Err(INVALID.to_string()));
        assert!(parse_number("0f123").unwrap_err().contains("8 or 16 digits"));
    }

    #[test]
    fn test_escapes() {
        assert_eq!(simple_escape('n'), Some('\n'));
        assert_eq!(simple_escape('q'), None);
        assert_eq!(escape_width('u'), Some((4, 16)));
        assert_eq!(decode_escape("41", 16), Some('A'));
        assert_eq!(decode_escape("101", 8), Some('A'));
        assert_eq!(decode_escape("zz", 16), None);
    }
}
