use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::types::{QueryOp, QueryValue, TextPattern};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z"];

const REGEX_SPECIALS: &[char] = &[
    '.', '*', '+', '?', '^', '$', '{', '}', '(', ')', '|', '[', ']', '\\',
];

/// Coerces a raw query-string operand.
///
/// Priority is fixed: `true`/`false` literals, then numbers, then dates
/// that start with `YYYY-MM-DD`, then the string unchanged. A field whose
/// values look numeric is always compared as a number.
pub fn coerce_value(raw: &str) -> QueryValue {
    match raw {
        "true" => return QueryValue::Bool(true),
        "false" => return QueryValue::Bool(false),
        _ => {}
    }

    if let Some(n) = parse_number(raw) {
        return QueryValue::Number(n);
    }

    if let Some(date) = parse_date(raw) {
        return QueryValue::Date(date);
    }

    QueryValue::String(raw.to_string())
}

/// Splits a comma-separated list operand and coerces each trimmed element.
pub fn coerce_list(raw: &str) -> Vec<QueryValue> {
    raw.split(',').map(|item| coerce_value(item.trim())).collect()
}

/// Decimal numbers with optional sign, fraction and exponent. Surrounding
/// whitespace is ignored; `inf`/`nan` spellings and overflow are rejected.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let plausible = trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !plausible {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parses values that start with `YYYY-MM-DD`. Timestamps without an offset are taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if !has_date_prefix(raw) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn has_date_prefix(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

/// Backslash-escapes `.*+?^${}()|[]\` so user text is matched literally.
pub fn escape_regex(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        if REGEX_SPECIALS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Builds the anchored pattern for `contains`, `startsWith` and `endsWith`.
/// Returns `None` for non-pattern operators.
pub fn text_pattern(op: QueryOp, literal: &str) -> Option<TextPattern> {
    let escaped = escape_regex(literal);
    let source = match op {
        QueryOp::Contains => escaped,
        QueryOp::StartsWith => format!("^{}", escaped),
        QueryOp::EndsWith => format!("{}$", escaped),
        _ => return None,
    };
    Some(TextPattern { literal: literal.to_string(), source })
}
