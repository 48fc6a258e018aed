//! Text encoding of [`Value`]s.
//!
//! Both file formats store values in the same textual form:
//!
//! - integers in decimal
//! - floating point as C `%.17g` (17 significant digits, `nan`, `inf`, `-inf`)
//! - strings in double quotes with backslash escapes
//!
//! [`decode`] is the exact inverse of [`encode`] for every non-empty value.

use thiserror::Error;

use crate::value::{Value, ValueType};

/// Significant digits used for floating point values.
const FLOAT_PRECISION: usize = 17;

/// Errors produced while decoding a value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Type name not in the canonical set.
    #[error("unknown type name '{0}'")]
    UnknownType(String),

    /// Value text could not be parsed as the expected type.
    #[error("invalid {ty} value '{text}'")]
    InvalidValue { ty: ValueType, text: String },

    /// Unsupported backslash escape in a string.
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(String),

    /// Quoted string without closing quote.
    #[error("unterminated string")]
    UnterminatedString,

    /// Characters after the closing quote of a string.
    #[error("unexpected trailing input '{0}'")]
    TrailingInput(String),

    /// Empty value text for a non-string type.
    #[error("missing value")]
    Empty,
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value to its stored text form. Empty values encode to `""`.
pub fn encode(value: &Value) -> String {
    match value {
        Value::Empty => String::new(),
        Value::Int8(v) => v.to_string(),
        Value::UInt8(v) => v.to_string(),
        Value::Int16(v) => v.to_string(),
        Value::UInt16(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::UInt32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::UInt64(v) => v.to_string(),
        Value::Float32(v) => format_general(f64::from(*v), FLOAT_PRECISION),
        Value::Float64(v) => format_general(*v, FLOAT_PRECISION),
        Value::String(s) => quote(s),
    }
}

/// Format like C's `%.{precision}g`.
pub fn format_general(v: f64, precision: usize) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let precision = precision.max(1);
    // Scientific form first: the exponent after rounding picks the notation.
    let sci = format!("{:.*e}", precision - 1, v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return sci;
    };

    if exp < -4 || exp >= precision as i32 {
        let mantissa = strip_fraction_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        strip_fraction_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn strip_fraction_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Wrap a string in double quotes, escaping as needed.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\u{0b}' => out.push_str("\\v"),
            '\u{1b}' => out.push_str("\\e"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode `text` as a value of type `ty`.
pub fn decode(text: &str, ty: ValueType) -> Result<Value, CodecError> {
    if ty == ValueType::String {
        return unquote(text).map(Value::String);
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(CodecError::Empty);
    }
    let invalid = || CodecError::InvalidValue {
        ty,
        text: text.to_string(),
    };

    let value = match ty {
        ValueType::Int8 => Value::Int8(text.parse().map_err(|_| invalid())?),
        ValueType::UInt8 => Value::UInt8(text.parse().map_err(|_| invalid())?),
        ValueType::Int16 => Value::Int16(text.parse().map_err(|_| invalid())?),
        ValueType::UInt16 => Value::UInt16(text.parse().map_err(|_| invalid())?),
        ValueType::Int32 => Value::Int32(text.parse().map_err(|_| invalid())?),
        ValueType::UInt32 => Value::UInt32(text.parse().map_err(|_| invalid())?),
        ValueType::Int64 => Value::Int64(text.parse().map_err(|_| invalid())?),
        ValueType::UInt64 => Value::UInt64(text.parse().map_err(|_| invalid())?),
        ValueType::Float32 => Value::Float32(text.parse().map_err(|_| invalid())?),
        ValueType::Float64 => Value::Float64(text.parse().map_err(|_| invalid())?),
        ValueType::String => unreachable!("handled above"),
    };
    Ok(value)
}

/// Decode a type name and value text pair.
pub fn decode_typed(type_name: &str, text: &str) -> Result<Value, CodecError> {
    let ty = ValueType::from_name(type_name)
        .ok_or_else(|| CodecError::UnknownType(type_name.to_string()))?;
    decode(text, ty)
}

/// Parse a string value.
///
/// A leading `"` starts a quoted string that must close at the end of the
/// input. Without it the whole input is taken as-is, still honouring escapes.
pub fn unquote(text: &str) -> Result<String, CodecError> {
    let (quoted, body) = match text.strip_prefix('"') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                let Some((_, esc)) = chars.next() else {
                    return Err(CodecError::InvalidEscape(String::new()));
                };
                match esc {
                    'x' => {
                        let hex: String = chars.by_ref().take(2).map(|(_, h)| h).collect();
                        let code = u8::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 2)
                            .ok_or_else(|| CodecError::InvalidEscape(format!("x{hex}")))?;
                        out.push(char::from(code));
                    }
                    esc if esc.is_whitespace() => out.push(esc),
                    esc => out.push(
                        translate_escape(esc)
                            .ok_or_else(|| CodecError::InvalidEscape(esc.to_string()))?,
                    ),
                }
            }
            '"' if quoted => {
                let rest = &body[idx + c.len_utf8()..];
                if !rest.trim().is_empty() {
                    return Err(CodecError::TrailingInput(rest.to_string()));
                }
                return Ok(out);
            }
            c => out.push(c),
        }
    }

    if quoted {
        Err(CodecError::UnterminatedString)
    } else {
        Ok(out)
    }
}

fn translate_escape(c: char) -> Option<char> {
    let translated = match c {
        'a' => '\u{07}',
        'b' => '\u{08}',
        'e' => '\u{1b}',
        'f' => '\u{0c}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{0b}',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        '?' => '?',
        _ => return None,
    };
    Some(translated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        let ty = value.value_type().unwrap();
        let text = encode(&value);
        let decoded = decode(&text, ty).unwrap_or_else(|e| panic!("{text}: {e}"));
        assert_eq!(decoded, value, "encoded as {text}");
    }

    #[test]
    fn test_round_trip_integer_extremes() {
        for v in [i8::MIN, -1, 0, i8::MAX] {
            round_trip(Value::Int8(v));
        }
        for v in [u8::MIN, u8::MAX] {
            round_trip(Value::UInt8(v));
        }
        for v in [i16::MIN, i16::MAX] {
            round_trip(Value::Int16(v));
        }
        for v in [u16::MIN, u16::MAX] {
            round_trip(Value::UInt16(v));
        }
        for v in [i32::MIN, -42, i32::MAX] {
            round_trip(Value::Int32(v));
        }
        for v in [u32::MIN, u32::MAX] {
            round_trip(Value::UInt32(v));
        }
        for v in [i64::MIN, i64::MAX] {
            round_trip(Value::Int64(v));
        }
        for v in [u64::MIN, u64::MAX] {
            round_trip(Value::UInt64(v));
        }
    }

    #[test]
    fn test_round_trip_floats() {
        for v in [
            0.0,
            -0.0,
            0.1,
            -1.5,
            1e300,
            -1e-300,
            f64::MAX,
            f64::MIN_POSITIVE,
            std::f64::consts::PI,
        ] {
            round_trip(Value::Float64(v));
        }
        for v in [
            0.0f32,
            0.1,
            -3.25,
            f32::MAX,
            f32::MIN,
            f32::MIN_POSITIVE,
            f32::EPSILON,
        ] {
            round_trip(Value::Float32(v));
        }
        round_trip(Value::Float64(f64::INFINITY));
        round_trip(Value::Float64(f64::NEG_INFINITY));
    }

    #[test]
    fn test_nan_round_trip() {
        let decoded = decode(&encode(&Value::Float64(f64::NAN)), ValueType::Float64).unwrap();
        assert!(decoded.value::<f64>().is_nan());
    }

    #[test]
    fn test_format_general_matches_printf() {
        assert_eq!(format_general(42.0, 17), "42");
        assert_eq!(format_general(0.1, 17), "0.10000000000000001");
        assert_eq!(format_general(-1.5, 17), "-1.5");
        assert_eq!(format_general(1e20, 17), "1e+20");
        assert_eq!(format_general(9.5367431640625e-07, 17), "9.5367431640625e-07");
        assert_eq!(format_general(123456.0, 6), "123456");
        assert_eq!(format_general(1234567.0, 6), "1.23457e+06");
        assert_eq!(format_general(0.0001, 6), "0.0001");
    }

    #[test]
    fn test_encode_integers() {
        assert_eq!(encode(&Value::Int32(42)), "42");
        assert_eq!(encode(&Value::Int8(-128)), "-128");
        assert_eq!(encode(&Value::UInt64(u64::MAX)), "18446744073709551615");
        assert_eq!(encode(&Value::Empty), "");
    }

    #[test]
    fn test_round_trip_strings() {
        for s in [
            "",
            "hello world",
            "say \"hi\"",
            "back\\slash",
            "tab\there\nnewline\r",
            "bell\u{07} esc\u{1b} nul\u{00} del\u{7f}",
            "  padded  ",
            "unicode \u{00e9}\u{4e2d}",
        ] {
            round_trip(Value::String(s.to_string()));
        }
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("hello world"), "\"hello world\"");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote("a\nb\tc"), "\"a\\nb\\tc\"");
        assert_eq!(quote("\u{01}"), "\"\\x01\"");
    }

    #[test]
    fn test_unquote_forms() {
        assert_eq!(unquote("\"quoted\"").unwrap(), "quoted");
        assert_eq!(unquote("raw").unwrap(), "raw");
        assert_eq!(unquote("esc\\ aped").unwrap(), "esc aped");
        assert_eq!(unquote("\"it\\'s\\?\"").unwrap(), "it's?");
        assert_eq!(unquote("\"x\"  ").unwrap(), "x");
    }

    #[test]
    fn test_unquote_errors() {
        assert_eq!(unquote("\"open"), Err(CodecError::UnterminatedString));
        assert_eq!(
            unquote("\"a\" b"),
            Err(CodecError::TrailingInput(" b".to_string()))
        );
        assert!(matches!(unquote("\"\\q\""), Err(CodecError::InvalidEscape(_))));
        assert!(matches!(unquote("\"\\x4\""), Err(CodecError::InvalidEscape(_))));
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        assert!(decode("256", ValueType::UInt8).is_err());
        assert!(decode("-1", ValueType::UInt32).is_err());
        assert!(decode("128", ValueType::Int8).is_err());
        assert!(decode("4.5", ValueType::Int32).is_err());
        assert!(decode("abc", ValueType::Float64).is_err());
        assert_eq!(decode("", ValueType::Int32), Err(CodecError::Empty));
    }

    #[test]
    fn test_decode_typed() {
        assert_eq!(decode_typed("int32_t", "42").unwrap(), Value::Int32(42));
        assert_eq!(decode_typed("double", "2.5").unwrap(), Value::Float64(2.5));
        assert_eq!(
            decode_typed("int128_t", "1"),
            Err(CodecError::UnknownType("int128_t".to_string()))
        );
    }
}
