//! Numeric literal parsing: underscore stripping, radix-prefixed integers,
//! and float parsing with the original-text retention rule from §4.4.
//!
//! Decimal integer and float conversion is delegated to `lexical-parse-integer`
//! and `lexical-parse-float`. Radix-prefixed integers (`0x`/`0o`/`0b`) have no
//! decimal-only fast path in those crates, so they are accumulated
//! digit-by-digit with checked 128-bit arithmetic here.

use lexical_parse_float::FromLexical as FloatFromLexical;
use lexical_parse_integer::FromLexical as IntFromLexical;

/// Why a numeric literal was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberError {
    /// An underscore appeared directly after a radix prefix or at the start
    /// of the digit run.
    LeadingUnderscore,
    /// No digits remained after stripping underscores and the prefix.
    EmptyDigits,
    /// A digit out of range for the declared radix appeared.
    InvalidDigit,
    /// The magnitude does not fit in a signed 128-bit integer.
    IntegerOverflow,
    /// The decimal text could not be parsed as a float at all (should not
    /// happen for tokenizer-validated input, but surfaced defensively).
    InvalidFloat,
}

/// The result of parsing one numeric token's text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNumber {
    /// A decimal, hex, octal, or binary integer literal.
    Integer(i128),
    /// A floating-point literal, with whether the original literal text
    /// must be retained for round-trip fidelity (see module docs and §4.4).
    Float { value: f64, keep_original: bool },
}

fn strip_underscores(s: &str) -> String {
    s.chars().filter(|&c| c != '_').collect()
}

/// Parse the text of a number token (as collected by the tokenizer,
/// including any leading sign) into an integer or float.
pub fn parse_number(text: &str) -> Result<ParsedNumber, NumberError> {
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    if let Some(digits) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        return parse_radix_integer(digits, 16, negative);
    }
    if let Some(digits) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
        return parse_radix_integer(digits, 8, negative);
    }
    if let Some(digits) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        return parse_radix_integer(digits, 2, negative);
    }

    let is_float = rest.contains('.') || rest.contains('e') || rest.contains('E');
    if is_float {
        parse_decimal_float(text)
    } else {
        parse_decimal_integer(text)
    }
}

fn parse_radix_integer(digits: &str, radix: u32, negative: bool) -> Result<ParsedNumber, NumberError> {
    if digits.starts_with('_') {
        return Err(NumberError::LeadingUnderscore);
    }
    let cleaned = strip_underscores(digits);
    if cleaned.is_empty() {
        return Err(NumberError::EmptyDigits);
    }
    let mut magnitude: i128 = 0;
    for c in cleaned.chars() {
        let digit = c.to_digit(radix).ok_or(NumberError::InvalidDigit)?;
        magnitude = magnitude
            .checked_mul(radix as i128)
            .and_then(|v| v.checked_add(digit as i128))
            .ok_or(NumberError::IntegerOverflow)?;
    }
    let value = if negative {
        magnitude.checked_neg().ok_or(NumberError::IntegerOverflow)?
    } else {
        magnitude
    };
    Ok(ParsedNumber::Integer(value))
}

fn parse_decimal_integer(text: &str) -> Result<ParsedNumber, NumberError> {
    if text.trim_start_matches(['+', '-']).starts_with('_') {
        return Err(NumberError::LeadingUnderscore);
    }
    let cleaned = strip_underscores(text);
    if cleaned.trim_start_matches(['+', '-']).is_empty() {
        return Err(NumberError::EmptyDigits);
    }
    let normalized = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    i128::from_lexical(normalized.as_bytes())
        .map(ParsedNumber::Integer)
        .map_err(|_| NumberError::IntegerOverflow)
}

fn parse_decimal_float(text: &str) -> Result<ParsedNumber, NumberError> {
    let has_exponent = text.contains('e') || text.contains('E');
    let cleaned = strip_underscores(text);
    let normalized = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    let value = f64::from_lexical(normalized.as_bytes()).map_err(|_| NumberError::InvalidFloat)?;

    let has_nonzero_digit = text.chars().any(|c| c.is_ascii_digit() && c != '0');
    let underflowed = value == 0.0 && has_nonzero_digit;
    let overflowed = value.is_infinite();
    let keep_original = has_exponent || overflowed || underflowed;

    Ok(ParsedNumber::Float {
        value,
        keep_original,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_integer() {
        assert_eq!(parse_number("42").unwrap(), ParsedNumber::Integer(42));
        assert_eq!(parse_number("-42").unwrap(), ParsedNumber::Integer(-42));
        assert_eq!(parse_number("1_000").unwrap(), ParsedNumber::Integer(1000));
    }

    #[test]
    fn hex_octal_binary() {
        assert_eq!(parse_number("0xFF").unwrap(), ParsedNumber::Integer(255));
        assert_eq!(parse_number("0o77").unwrap(), ParsedNumber::Integer(63));
        assert_eq!(parse_number("0b1010").unwrap(), ParsedNumber::Integer(10));
        assert_eq!(parse_number("-0x10").unwrap(), ParsedNumber::Integer(-16));
    }

    #[test]
    fn leading_underscore_after_prefix_rejected() {
        assert_eq!(
            parse_number("0x_FF"),
            Err(NumberError::LeadingUnderscore)
        );
    }

    #[test]
    fn float_without_exponent_does_not_keep_original() {
        match parse_number("1.5").unwrap() {
            ParsedNumber::Float {
                value,
                keep_original,
            } => {
                assert_eq!(value, 1.5);
                assert!(!keep_original);
            }
            _ => panic!("expected float"),
        }
    }

    #[test]
    fn float_with_exponent_keeps_original() {
        match parse_number("1.5e10").unwrap() {
            ParsedNumber::Float { keep_original, .. } => assert!(keep_original),
            _ => panic!("expected float"),
        }
    }

    #[test]
    fn underflow_keeps_original() {
        match parse_number("1e-400").unwrap() {
            ParsedNumber::Float {
                value,
                keep_original,
            } => {
                assert_eq!(value, 0.0);
                assert!(keep_original);
            }
            _ => panic!("expected float"),
        }
    }

    #[test]
    fn overflow_keeps_original() {
        match parse_number("1e400").unwrap() {
            ParsedNumber::Float {
                value,
                keep_original,
            } => {
                assert!(value.is_infinite());
                assert!(keep_original);
            }
            _ => panic!("expected float"),
        }
    }
}
