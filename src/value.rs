// Typed scalars and the coercion rules that turn raw dump tokens into them.
// Coercion is total: dirty input always lands in some variant, usually Text.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};

static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?:\s+\d{2}:\d{2}:\d{2})?").expect("valid date regex")
});

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    // Render the value back into dump syntax so a rejected row can be
    // re-parsed by recovery with the same tokenizer and coercion.
    pub fn to_sql_literal(&self) -> String {
        match self {
            ScalarValue::Null => "NULL".to_string(),
            ScalarValue::Integer(v) => v.to_string(),
            ScalarValue::Float(v) => format!("{:?}", v),
            ScalarValue::Text(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\'' => out.push_str("''"),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        '\0' => out.push_str("\\0"),
                        other => out.push(other),
                    }
                }
                out.push('\'');
                out
            }
        }
    }
}

impl ToSql for ScalarValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            ScalarValue::Null => ToSqlOutput::Owned(Value::Null),
            ScalarValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            ScalarValue::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            ScalarValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

// Render a whole row as a parenthesized dump tuple.
pub fn render_tuple(values: &[ScalarValue]) -> String {
    let parts: Vec<String> = values.iter().map(ScalarValue::to_sql_literal).collect();
    format!("({})", parts.join(", "))
}

// Convert one raw token into a scalar. First matching rule wins.
pub fn coerce(raw: &str) -> ScalarValue {
    let val = raw.trim();
    if val.is_empty() || val.eq_ignore_ascii_case("NULL") {
        return ScalarValue::Null;
    }

    if let Some(payload) = bit_literal_payload(val) {
        return match payload {
            "0" => ScalarValue::Integer(0),
            "1" => ScalarValue::Integer(1),
            other => ScalarValue::Text(other.to_string()),
        };
    }

    if val.eq_ignore_ascii_case("TRUE") {
        return ScalarValue::Integer(1);
    }
    if val.eq_ignore_ascii_case("FALSE") {
        return ScalarValue::Integer(0);
    }

    if let Some(quote) = quoted_with(val) {
        return ScalarValue::Text(unescape_quoted(&val[1..val.len() - 1], quote));
    }

    if DATE_TIME_RE.is_match(val) {
        return ScalarValue::Text(val.to_string());
    }

    coerce_number(val)
}

fn coerce_number(val: &str) -> ScalarValue {
    if val.contains(['.', 'e', 'E']) {
        return match val.parse::<f64>() {
            Ok(f) if f.is_finite() => ScalarValue::Float(f),
            _ => ScalarValue::Text(val.to_string()),
        };
    }
    match val.parse::<i64>() {
        Ok(n) => ScalarValue::Integer(n),
        // Out of range integers keep their digits instead of wrapping.
        Err(_) => ScalarValue::Text(val.to_string()),
    }
}

// b'0' / b"1" style literals; returns the raw payload.
fn bit_literal_payload(val: &str) -> Option<&str> {
    let bytes = val.as_bytes();
    if bytes.len() < 3 || !(bytes[0] == b'b' || bytes[0] == b'B') {
        return None;
    }
    let quote = bytes[1];
    if (quote == b'\'' || quote == b'"') && bytes[bytes.len() - 1] == quote {
        Some(&val[2..val.len() - 1])
    } else {
        None
    }
}

fn quoted_with(val: &str) -> Option<char> {
    let bytes = val.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let first = bytes[0];
    if (first == b'\'' || first == b'"') && bytes[bytes.len() - 1] == first {
        Some(first as char)
    } else {
        None
    }
}

// Resolve doubled quotes and MySQL backslash escapes inside a string body.
fn unescape_quoted(inner: &str, quote: char) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('b') => out.push('\u{8}'),
                Some('Z') => out.push('\u{1a}'),
                Some(e @ ('\\' | '\'' | '"')) => out.push(e),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else if c == quote && chars.peek() == Some(&quote) {
            chars.next();
            out.push(quote);
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ScalarValue {
        ScalarValue::Text(s.to_string())
    }

    #[test]
    fn null_and_booleans() {
        assert_eq!(coerce("NULL"), ScalarValue::Null);
        assert_eq!(coerce("null"), ScalarValue::Null);
        assert_eq!(coerce("  "), ScalarValue::Null);
        assert_eq!(coerce("TRUE"), ScalarValue::Integer(1));
        assert_eq!(coerce("false"), ScalarValue::Integer(0));
    }

    #[test]
    fn bit_literals() {
        assert_eq!(coerce("b'0'"), ScalarValue::Integer(0));
        assert_eq!(coerce("b'1'"), ScalarValue::Integer(1));
        assert_eq!(coerce("b\"1\""), ScalarValue::Integer(1));
        assert_eq!(coerce("b'101'"), text("101"));
    }

    #[test]
    fn quoted_strings_resolve_escapes() {
        assert_eq!(coerce(r"'O''Brien\'s'"), text("O'Brien's"));
        assert_eq!(coerce(r#""say \"hi\"""#), text("say \"hi\""));
        assert_eq!(coerce(r"'a\nb\tc\\d'"), text("a\nb\tc\\d"));
        assert_eq!(coerce("''"), text(""));
        assert_eq!(coerce(r"'C:\q'"), text(r"C:\q"));
    }

    #[test]
    fn dates_stay_text() {
        assert_eq!(coerce("2015-03-01 12:30:00"), text("2015-03-01 12:30:00"));
        assert_eq!(coerce("2015-03-01"), text("2015-03-01"));
    }

    #[test]
    fn numbers() {
        assert_eq!(coerce("42"), ScalarValue::Integer(42));
        assert_eq!(coerce("-7"), ScalarValue::Integer(-7));
        assert_eq!(coerce("55.75"), ScalarValue::Float(55.75));
        assert_eq!(coerce("1e3"), ScalarValue::Float(1000.0));
        assert_eq!(
            coerce("9223372036854775807"),
            ScalarValue::Integer(i64::MAX)
        );
    }

    #[test]
    fn oversized_integer_becomes_digit_text() {
        assert_eq!(coerce("99999999999999999999"), text("99999999999999999999"));
        assert_eq!(coerce("-9223372036854775809"), text("-9223372036854775809"));
    }

    #[test]
    fn residue_passes_through() {
        assert_eq!(coerce("0xDEADBEEF"), text("0xDEADBEEF"));
        assert_eq!(coerce("abc"), text("abc"));
        assert_eq!(coerce("1e999"), text("1e999"));
        assert_eq!(coerce("'unterminated"), text("'unterminated"));
    }

    #[test]
    fn literal_rendering_reparses_to_same_value() {
        let values = vec![
            ScalarValue::Null,
            ScalarValue::Integer(-3),
            ScalarValue::Float(2.0),
            text("it's a \\ \"key\"\nline"),
        ];
        for v in values {
            assert_eq!(coerce(&v.to_sql_literal()), v);
        }
    }
}
